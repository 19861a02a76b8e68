//! Downloading a package from the metadata service

use sipforge_errors::{Error, MetadataError};
use sipforge_events::{EventEmitter, EventSender, FailureContext, FetchEvent, PackageEvent};
use sipforge_remote::{cached_document, parse_activity, parse_attachment, RemoteClient};
use sipforge_types::{Activity, Attachment, EntityKind};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::fetcher::{fetch_all, prune_orphans};
use crate::package::{check_filename, Package};

impl Package {
    /// Download a record with its attachments, activities and description
    /// into `root`
    ///
    /// The Object record is fetched on every call. Attachments, activities
    /// and the description already on disk are reused, and sub-resources
    /// the record no longer references are removed.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::Truncated` if the record is not fully
    /// readable, `PreservationError::InvalidFilename` for unacceptable
    /// attachment names, or the first fetch failure.
    pub async fn download(
        client: &RemoteClient,
        root: impl Into<PathBuf>,
        object_id: u64,
        variant: Option<String>,
        description_report_id: u64,
        events: Option<&EventSender>,
    ) -> Result<Self, Error> {
        let root = root.into();

        info!(object_id, "retrieving object");
        let record = client.fetch_object(object_id).await?;
        if record.id != object_id {
            return Err(MetadataError::malformed(format!(
                "requested object {object_id} but received {}",
                record.id
            ))
            .into());
        }

        let mut package = Self::new(root, record, variant);
        package.create_layout().await?;

        let attachment_ids = package.record().attachment_ids.clone();
        let attachments = fetch_batch(events, EntityKind::Multimedia, &attachment_ids, |id| {
            fetch_attachment(client.clone(), package.entity_dir(EntityKind::Multimedia, id), id, events.cloned())
        })
        .await?;
        prune(events, EntityKind::Multimedia, &package.attachments_dir(), &attachment_ids).await?;
        package.set_attachments(attachments);

        let activity_ids = package.record().activity_ids.clone();
        let activities =
            fetch_batch(events, EntityKind::CollectionActivity, &activity_ids, |id| {
                fetch_activity(
                    client.clone(),
                    package.entity_dir(EntityKind::CollectionActivity, id),
                    id,
                )
            })
            .await?;
        prune(events, EntityKind::CollectionActivity, &package.activities_dir(), &activity_ids)
            .await?;
        package.set_activities(activities);

        cached_document(
            client,
            &RemoteClient::description_path(object_id, description_report_id),
            &package.description_path(),
        )
        .await?;
        let record_path = package.metadata_document_path(EntityKind::Object, object_id);
        fs::write(&record_path, &package.record().document)
            .await
            .map_err(|e| Error::io_with_path(&e, &record_path))?;

        package.populate_files().await?;
        events.emit_package(PackageEvent::Downloaded {
            object_id,
            payload_files: package.files().len(),
        });
        Ok(package)
    }
}

async fn fetch_batch<T, F, Fut>(
    events: Option<&EventSender>,
    kind: EntityKind,
    ids: &[u64],
    fetch_one: F,
) -> Result<Vec<T>, Error>
where
    T: Send + 'static,
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
{
    let kind_name = kind.module_name().to_string();
    events.emit_fetch(FetchEvent::BatchStarted {
        kind: kind_name.clone(),
        count: ids.len(),
    });
    match fetch_all(ids, fetch_one).await {
        Ok(results) => {
            events.emit_fetch(FetchEvent::BatchCompleted {
                kind: kind_name,
                count: results.len(),
            });
            Ok(results)
        }
        Err(e) => {
            events.emit_fetch(FetchEvent::BatchFailed {
                kind: kind_name,
                failure: FailureContext::from_error(&e),
            });
            Err(e)
        }
    }
}

async fn prune(
    events: Option<&EventSender>,
    kind: EntityKind,
    dir: &Path,
    ids: &[u64],
) -> Result<(), Error> {
    let keep: HashSet<u64> = ids.iter().copied().collect();
    for id in prune_orphans(dir, &keep).await? {
        events.emit_fetch(FetchEvent::Pruned {
            kind: kind.module_name().to_string(),
            id,
        });
    }
    Ok(())
}

async fn fetch_attachment(
    client: RemoteClient,
    dir: PathBuf,
    id: u64,
    events: Option<EventSender>,
) -> Result<Attachment, Error> {
    create_dir(&dir).await?;
    let document = cached_document(
        &client,
        &RemoteClient::record_path(EntityKind::Multimedia, id),
        &dir.join(EntityKind::Multimedia.document_name()),
    )
    .await?;
    let attachment = parse_attachment(&document.data)?;

    let filename = attachment.payload_filename();
    check_filename(&filename)?;
    let filename = Path::new(&filename)
        .file_name()
        .map_or_else(|| format!("Multimedia_{id}.attachment"), |n| n.to_string_lossy().into_owned());
    let payload = dir.join(&filename);

    let kind = EntityKind::Multimedia.module_name().to_string();
    if is_non_empty_file(&payload).await {
        debug!(attachment_id = id, file = %filename, "skipping existing attachment");
        events.emit_fetch(FetchEvent::Skipped { kind, id });
        return Ok(attachment);
    }

    info!(attachment_id = id, file = %filename, "downloading attachment");
    let bytes = client.download_attachment(id, &payload).await?;
    events.emit_fetch(FetchEvent::Downloaded { kind, id, bytes });
    Ok(attachment)
}

async fn fetch_activity(client: RemoteClient, dir: PathBuf, id: u64) -> Result<Activity, Error> {
    create_dir(&dir).await?;
    let document = cached_document(
        &client,
        &RemoteClient::record_path(EntityKind::CollectionActivity, id),
        &dir.join(EntityKind::CollectionActivity.document_name()),
    )
    .await?;
    parse_activity(&document.data)
}

async fn create_dir(dir: &Path) -> Result<(), Error> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::io_with_path(&e, dir))
}

async fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}
