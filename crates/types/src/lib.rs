#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for sipforge
//!
//! Records and their sub-resources as fetched from the metadata service,
//! provenance events, and the file format whitelist used during validation.

pub mod format;
pub mod provenance;
pub mod record;

pub use format::FileCategory;
pub use provenance::{EventOutcome, EventType, ProvenanceEvent};
pub use record::{
    Activity, Attachment, EntityKind, MultimediaSearchResult, ObjectSearchResult, Record,
};

use serde::{Deserialize, Serialize};

/// Whether a package is a first submission or an update of a previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Submission,
    Update,
}

impl RecordStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submission => "submission",
            Self::Update => "update",
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome reported by the preservation service for a submitted package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionOutcome {
    Accepted,
    Rejected,
}

impl SubmissionOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for SubmissionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
