//! sipforge - archival SIP assembly
//!
//! Downloads records from the collection management service, assembles
//! them into signed submission packages and records the outcome of each
//! submission.

mod cli;
mod error;
mod logging;

use crate::cli::{Cli, Commands, SearchKind};
use crate::error::CliError;
use chrono::Utc;
use clap::Parser;
use sipforge_config::Config;
use sipforge_events::{EventReceiver, EventSender};
use sipforge_package::{
    confirm, AssemblyOptions, AssemblySettings, Package, PackageAssembler, PreservationField,
    ProcessToolRunner,
};
use sipforge_remote::{RemoteClient, SearchPager, SearchResultItem, VolatileField};
use sipforge_types::RecordStatus;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tokio::select;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // Precedence: file (or defaults), then environment
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;

    logging::init_tracing(cli.global.json, cli.global.debug, &config.logging.level);
    info!("Starting sipforge v{}", env!("CARGO_PKG_VERSION"));

    let (event_sender, event_receiver) = sipforge_events::channel();
    execute_command_with_events(cli.command, config, event_sender, event_receiver).await?;

    info!("Command completed successfully");
    Ok(())
}

/// Execute a command while rendering its events
async fn execute_command_with_events(
    command: Commands,
    config: Config,
    event_sender: EventSender,
    mut event_receiver: EventReceiver,
) -> Result<(), CliError> {
    let mut command_future = Box::pin(execute_command(command, config, event_sender));

    loop {
        select! {
            result = &mut command_future => {
                while let Ok(event) = event_receiver.try_recv() {
                    logging::log_event_with_tracing(&event);
                }
                return result;
            }

            event = event_receiver.recv() => {
                if let Some(event) = event {
                    logging::log_event_with_tracing(&event);
                }
            }
        }
    }
}

async fn execute_command(
    command: Commands,
    config: Config,
    events: EventSender,
) -> Result<(), CliError> {
    match command {
        Commands::Download { object_id, variant } => {
            let client = connect(&config).await?;
            let root = Package::root_for(&config.package_dir(), object_id, variant.as_deref());
            let package = Package::download(
                &client,
                &root,
                object_id,
                variant,
                config.remote.lido_report_id,
                Some(&events),
            )
            .await?;
            println!("{}", package.root().display());
        }

        Commands::Assemble {
            object_id,
            variant,
            create_date,
            modify_date,
            update,
        } => {
            let settings = AssemblySettings::from_config(&config)?;
            let root = Package::root_for(&config.package_dir(), object_id, variant.as_deref());
            let mut package = Package::open(root, variant).await?;

            let mut runner = ProcessToolRunner::new();
            if let Some(venv) = &config.tools.virtualenv_path {
                runner = runner.with_virtualenv(venv);
            }
            let options = AssemblyOptions {
                create_date: create_date.unwrap_or_else(Utc::now),
                modify_date,
                status: if update {
                    RecordStatus::Update
                } else {
                    RecordStatus::Submission
                },
            };

            let assembler =
                PackageAssembler::new(Arc::new(runner), settings).with_events(events.clone());
            let report = assembler.assemble(&mut package, &options).await?;
            println!("{} {}", report.archive_hash, report.archive_path.display());
        }

        Commands::Confirm {
            object_id,
            variant,
            status,
        } => {
            let root = Package::root_for(&config.package_dir(), object_id, variant.as_deref());
            let package = Package::open(root, variant).await?;

            let remote = &config.remote;
            let target = match (
                &remote.object_preservation_field_name,
                &remote.object_preservation_field_type,
            ) {
                (Some(name), Some(field_type)) => {
                    let client = connect(&config).await?;
                    let field = PreservationField {
                        client: &client,
                        name,
                        field_type,
                    };
                    confirm(package, &config.archive_dir(), status, Some(field), Some(&events))
                        .await?
                }
                _ => confirm(package, &config.archive_dir(), status, None, Some(&events)).await?,
            };
            println!("{}", target.display());
        }

        Commands::Search {
            kind,
            modified_since,
            limit,
        } => {
            let client = connect(&config).await?;
            match kind {
                SearchKind::Object => {
                    print_search::<sipforge_types::ObjectSearchResult>(
                        &client,
                        &config,
                        limit,
                        modified_since,
                    )
                    .await?;
                }
                SearchKind::Multimedia => {
                    print_search::<sipforge_types::MultimediaSearchResult>(
                        &client,
                        &config,
                        limit,
                        modified_since,
                    )
                    .await?;
                }
            }
        }
    }
    Ok(())
}

async fn connect(config: &Config) -> Result<RemoteClient, CliError> {
    config.validate_for_remote()?;
    Ok(RemoteClient::connect(&config.remote, &config.session_dir()).await?)
}

/// Page through a search, writing one JSON line per result
async fn print_search<T>(
    client: &RemoteClient,
    config: &Config,
    limit: usize,
    modified_since: Option<chrono::DateTime<Utc>>,
) -> Result<(), CliError>
where
    T: SearchResultItem + serde::Serialize,
{
    let mut pager = SearchPager::<T>::new(client, limit, 0, modified_since);
    let remote = &config.remote;
    if let Some(name) = &remote.object_preservation_field_name {
        let element = remote
            .object_preservation_field_type
            .as_deref()
            .unwrap_or("dataField");
        pager = pager.with_volatile_field(VolatileField::new(element, name.clone()));
    }

    while let Some(page) = pager.next_page().await? {
        let mut stdout = std::io::stdout().lock();
        for item in page {
            let line = serde_json::to_string(&item).map_err(sipforge_errors::Error::from)?;
            writeln!(stdout, "{line}")?;
        }
    }
    Ok(())
}
