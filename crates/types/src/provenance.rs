//! Provenance (PREMIS) event values

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Creation,
    Transfer,
    Decompression,
}

impl EventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Creation => "creation",
            Self::Transfer => "transfer",
            Self::Decompression => "decompression",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    Success,
    Failure,
}

impl EventOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// A single provenance event to embed into the package metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceEvent {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
    pub outcome: EventOutcome,
    /// Path relative to the package's payload root
    pub target: Option<PathBuf>,
    pub outcome_detail: Option<String>,
}

impl ProvenanceEvent {
    /// Successful event with no target
    #[must_use]
    pub fn success(
        event_type: EventType,
        timestamp: DateTime<Utc>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            timestamp,
            detail: detail.into(),
            outcome: EventOutcome::Success,
            target: None,
            outcome_detail: None,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target = Some(target.into());
        self
    }

    #[must_use]
    pub fn with_outcome_detail(mut self, outcome_detail: impl Into<String>) -> Self {
        self.outcome_detail = Some(outcome_detail.into());
        self
    }
}
