use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Package lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PackageEvent {
    Downloaded {
        object_id: u64,
        payload_files: usize,
    },

    AssemblyStarted {
        object_id: u64,
        sip_filename: String,
    },

    Assembled {
        object_id: u64,
        archive_path: String,
        archive_hash: String,
    },

    /// A per-record domain error stopped assembly
    Frozen {
        object_id: u64,
        reason: String,
        failure: FailureContext,
    },

    Confirmed {
        object_id: u64,
        outcome: String,
    },
}
