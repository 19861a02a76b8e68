use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Events for the external transformation stages of assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StageEvent {
    Started {
        stage: String,
    },

    /// A single external tool invocation finished
    CommandCompleted {
        stage: String,
        exit_code: Option<i32>,
    },

    Completed {
        stage: String,
    },

    Failed {
        stage: String,
        failure: FailureContext,
    },
}
