//! Command line interface definition

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use sipforge_remote::parse_timestamp;
use sipforge_types::SubmissionOutcome;
use std::path::PathBuf;

/// sipforge - assemble archival SIPs from collection management records
#[derive(Parser)]
#[command(name = "sipforge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Assemble archival SIPs from collection management records")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Download a record with its attachments and description
    Download {
        object_id: u64,

        /// Build an independent package of the same record
        #[arg(long)]
        variant: Option<String>,
    },

    /// Assemble a downloaded package into a signed SIP
    Assemble {
        object_id: u64,

        #[arg(long)]
        variant: Option<String>,

        /// Creation date of the SIP (defaults to now)
        #[arg(long, value_name = "ISO", value_parser = parse_timestamp)]
        create_date: Option<DateTime<Utc>>,

        /// Modification date, required for updates
        #[arg(long, value_name = "ISO", value_parser = parse_timestamp)]
        modify_date: Option<DateTime<Utc>>,

        /// Submit as an update of an earlier SIP
        #[arg(long, requires = "modify_date")]
        update: bool,
    },

    /// Record the outcome of a submitted SIP and remove its package
    Confirm {
        object_id: u64,

        #[arg(long)]
        variant: Option<String>,

        #[arg(long, value_enum)]
        status: SubmissionOutcome,
    },

    /// Search records, printing one JSON line per result
    Search {
        #[arg(value_enum)]
        kind: SearchKind,

        /// Only records modified at or after this time
        #[arg(long, value_name = "ISO", value_parser = parse_timestamp)]
        modified_since: Option<DateTime<Utc>>,

        /// Results per page
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchKind {
    Object,
    Multimedia,
}
