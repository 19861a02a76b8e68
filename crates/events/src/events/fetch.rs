use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Events emitted while materializing remote resources on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FetchEvent {
    /// A batch of sub-resources is being fetched
    BatchStarted { kind: String, count: usize },

    /// A resource was retrieved from the service
    Downloaded {
        kind: String,
        id: u64,
        bytes: Option<u64>,
    },

    /// A resource was already present on disk
    Skipped { kind: String, id: u64 },

    /// A stale sub-resource directory was deleted
    Pruned { kind: String, id: String },

    BatchCompleted { kind: String, count: usize },

    BatchFailed {
        kind: String,
        failure: FailureContext,
    },
}
