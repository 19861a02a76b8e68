//! Recording the outcome of a submitted package

use chrono::Utc;
use sipforge_errors::Error;
use sipforge_events::{EventEmitter, EventSender, PackageEvent};
use sipforge_remote::{append_preservation_entry, PreservationLogEntry, RemoteClient};
use sipforge_types::SubmissionOutcome;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::archive::gzip_into;
use crate::package::Package;

/// Object field on the metadata service that collects preservation entries
#[derive(Clone, Copy)]
pub struct PreservationField<'a> {
    pub client: &'a RemoteClient,
    pub name: &'a str,
    pub field_type: &'a str,
}

/// Archive the logs of a submitted package and remove it
///
/// The logs are gzipped into `{archive_dir}/{parts..}/{sip_filename}` next to an
/// empty `.{outcome}` marker. When `field` is given the outcome is also
/// appended to the object's preservation log. Returns the directory the
/// logs were archived to.
///
/// # Errors
///
/// Returns `MetadataError::MissingField` if the record has no modification
/// date, or an I/O or network error. The package is left in place on error.
pub async fn confirm(
    package: Package,
    archive_dir: &Path,
    outcome: SubmissionOutcome,
    field: Option<PreservationField<'_>>,
    events: Option<&EventSender>,
) -> Result<PathBuf, Error> {
    let object_id = package.object_id();
    let sip_filename = package.sip_filename()?;
    let target: PathBuf = package
        .archive_path_parts()?
        .into_iter()
        .fold(archive_dir.to_path_buf(), |dir, part| dir.join(part));

    fs::create_dir_all(&target)
        .await
        .map_err(|e| Error::io_with_path(&e, &target))?;
    let archived = archive_logs(&package.log_dir(), &target).await?;
    debug!(object_id, archived, target = %target.display(), "archived stage logs");

    let marker = target.join(format!(".{outcome}"));
    fs::write(&marker, b"")
        .await
        .map_err(|e| Error::io_with_path(&e, &marker))?;

    if let Some(field) = field {
        let entry = PreservationLogEntry {
            filename: sip_filename,
            status: outcome.as_str().to_string(),
            object_modify_date: package.record().modified_date.map(|d| d.to_rfc3339()),
            date: Utc::now().to_rfc3339(),
        };
        append_preservation_entry(field.client, object_id, field.name, field.field_type, entry)
            .await?;
    }

    let root = package.root();
    fs::remove_dir_all(root)
        .await
        .map_err(|e| Error::io_with_path(&e, root))?;

    info!(object_id, outcome = %outcome, "package confirmed");
    events.emit_package(PackageEvent::Confirmed {
        object_id,
        outcome: outcome.as_str().to_string(),
    });
    Ok(target)
}

async fn archive_logs(log_dir: &Path, target: &Path) -> Result<usize, Error> {
    let mut entries = match fs::read_dir(log_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::io_with_path(&e, log_dir)),
    };

    let mut logs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_with_path(&e, log_dir))?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "log") {
            logs.push(path);
        }
    }
    logs.sort();

    Ok(gzip_into(logs, target).await?.len())
}
