//! Logging setup and rendering of events through tracing

use sipforge_events::{AppEvent, FetchEvent, PackageEvent, StageEvent};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber
///
/// `RUST_LOG` wins over the configured level; `--debug` forces debug.
pub fn init_tracing(json: bool, debug_enabled: bool, configured_level: &str) {
    let fallback = if debug_enabled {
        "debug".to_string()
    } else {
        format!("warn,sipforge={configured_level},sipforge_package={configured_level},sipforge_remote={configured_level}")
    };
    let filter = if debug_enabled {
        EnvFilter::new(fallback)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    };

    // stdout is reserved for command output
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Log an `AppEvent` with structured fields
pub fn log_event_with_tracing(event: &AppEvent) {
    match event {
        AppEvent::Fetch(fetch) => match fetch {
            FetchEvent::BatchStarted { kind, count } => {
                info!(kind = %kind, count, "Fetching resources");
            }
            FetchEvent::Downloaded { kind, id, bytes } => {
                info!(kind = %kind, id, bytes = ?bytes, "Resource downloaded");
            }
            FetchEvent::Skipped { kind, id } => {
                debug!(kind = %kind, id, "Resource already present");
            }
            FetchEvent::Pruned { kind, id } => {
                info!(kind = %kind, id = %id, "Stale resource removed");
            }
            FetchEvent::BatchCompleted { kind, count } => {
                info!(kind = %kind, count, "Resources fetched");
            }
            FetchEvent::BatchFailed { kind, failure } => {
                error!(
                    kind = %kind,
                    retryable = failure.retryable,
                    code = ?failure.code,
                    message = %failure.message,
                    hint = ?failure.hint,
                    "Fetching resources failed"
                );
            }
        },

        AppEvent::Stage(stage_event) => match stage_event {
            StageEvent::Started { stage } => {
                info!(stage = %stage, "Stage started");
            }
            StageEvent::CommandCompleted { stage, exit_code } => {
                debug!(stage = %stage, exit_code = ?exit_code, "Tool finished");
            }
            StageEvent::Completed { stage } => {
                info!(stage = %stage, "Stage completed");
            }
            StageEvent::Failed { stage, failure } => {
                error!(
                    stage = %stage,
                    code = ?failure.code,
                    message = %failure.message,
                    "Stage failed"
                );
            }
        },

        AppEvent::Package(package) => match package {
            PackageEvent::Downloaded {
                object_id,
                payload_files,
            } => {
                info!(object_id, payload_files, "Package downloaded");
            }
            PackageEvent::AssemblyStarted {
                object_id,
                sip_filename,
            } => {
                info!(object_id, sip = %sip_filename, "Assembly started");
            }
            PackageEvent::Assembled {
                object_id,
                archive_path,
                archive_hash,
            } => {
                info!(
                    object_id,
                    archive = %archive_path,
                    hash = %archive_hash,
                    "Package assembled"
                );
            }
            PackageEvent::Frozen {
                object_id,
                reason,
                failure,
            } => {
                warn!(
                    object_id,
                    reason = %reason,
                    code = ?failure.code,
                    message = %failure.message,
                    "Record frozen"
                );
            }
            PackageEvent::Confirmed { object_id, outcome } => {
                info!(object_id, outcome = %outcome, "Package confirmed");
            }
        },
    }
}
