//! Deriving provenance events from a downloaded package
//!
//! Every rule reads local state only. Rules run in a fixed order and their
//! events are concatenated.

use chrono::{DateTime, Datelike, Utc};
use sipforge_errors::Error;
use sipforge_types::{EntityKind, EventType, ProvenanceEvent};
use std::path::PathBuf;
use tokio::fs;

use crate::package::Package;

/// Records were migrated from the legacy system during November 2018
const MIGRATION_YEAR: i32 = 2018;
const MIGRATION_MONTH: u32 = 11;

/// Creator recorded on everything the migration created
const MIGRATION_CREATOR: &str = "ZET_DÜ";

fn is_migrated(created: DateTime<Utc>, creator: Option<&str>) -> bool {
    created.year() == MIGRATION_YEAR
        && created.month() == MIGRATION_MONTH
        && creator == Some(MIGRATION_CREATOR)
}

/// Derive all provenance events for `package`
///
/// # Errors
///
/// Returns `MetadataError::NotLoaded` if attachments or activities have not
/// been loaded, or an I/O error if the description document is missing.
pub async fn derive_events(package: &Package) -> Result<Vec<ProvenanceEvent>, Error> {
    let record = package.record();
    let attachments = package.attachments()?;
    let activities = package.activities()?;
    let target = |kind: EntityKind, id: u64| -> PathBuf {
        package.sip_relative(&package.metadata_document_path(kind, id))
    };

    let mut events = Vec::new();

    if let Some(created) = record.created_date {
        events.push(
            ProvenanceEvent::success(EventType::Creation, created, "Object database entry creation")
                .with_outcome_detail(
                    "Object creation date in the collection management system",
                ),
        );
    }

    for attachment in attachments {
        if let Some(created) = attachment.created_date {
            events.push(
                ProvenanceEvent::success(EventType::Creation, created, "Multimedia creation")
                    .with_outcome_detail(
                        "Multimedia creation date in the collection management system",
                    )
                    .with_target(target(EntityKind::Multimedia, attachment.id)),
            );
        }
    }

    if let Some(created) = record.created_date {
        if is_migrated(created, record.created_user.as_deref()) {
            events.push(
                ProvenanceEvent::success(EventType::Transfer, created, "Object legacy migration")
                    .with_outcome_detail(
                        "Object migrated to the collection management system from the legacy \
                         system",
                    ),
            );
        }
    }

    for attachment in attachments {
        let Some(created) = attachment.created_date else {
            continue;
        };
        if is_migrated(created, attachment.created_user.as_deref()) {
            events.push(
                ProvenanceEvent::success(
                    EventType::Transfer,
                    created,
                    "Multimedia legacy migration",
                )
                .with_outcome_detail(
                    "Multimedia migrated to the collection management system from the legacy \
                     system",
                )
                .with_target(target(EntityKind::Multimedia, attachment.id)),
            );
        }
    }

    for activity in activities {
        if let Some(created) = activity.created_date {
            events.push(
                ProvenanceEvent::success(
                    EventType::Creation,
                    created,
                    "CollectionActivity creation",
                )
                .with_outcome_detail(
                    "CollectionActivity creation date in the collection management system",
                )
                .with_target(target(EntityKind::CollectionActivity, activity.id)),
            );
        }
    }

    // The service does not report when the description was generated; the
    // file was written right after generation, so its mtime stands in.
    let description = package.description_path();
    let generated: DateTime<Utc> = fs::metadata(&description)
        .await
        .and_then(|meta| meta.modified())
        .map_err(|e| Error::io_with_path(&e, &description))?
        .into();
    events.push(
        ProvenanceEvent::success(EventType::Creation, generated, "LIDO document creation")
            .with_outcome_detail(
                "LIDO document generated in the collection management system from the Object",
            )
            .with_target(package.sip_relative(&description)),
    );

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use filetime::FileTime;
    use sipforge_types::{Activity, Attachment, Record};
    use tempfile::tempdir;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    fn attachment(id: u64, created: Option<DateTime<Utc>>, user: &str) -> Attachment {
        Attachment {
            id,
            filename: Some(format!("{id}.tif")),
            created_date: created,
            created_user: Some(user.to_string()),
            modified_date: None,
        }
    }

    async fn package(
        root: &std::path::Path,
        created: Option<DateTime<Utc>>,
        user: &str,
        attachments: Vec<Attachment>,
        activities: Vec<Activity>,
    ) -> Package {
        let record = Record {
            id: 1,
            title: None,
            created_date: created,
            created_user: Some(user.to_string()),
            modified_date: Some(at(2020, 1, 1)),
            attachment_ids: attachments.iter().map(|a| a.id).collect(),
            activity_ids: activities.iter().map(|a| a.id).collect(),
            document: Vec::new(),
        };
        let mut package = Package::new(root, record, None);
        package.create_layout().await.unwrap();
        std::fs::write(package.description_path(), b"<lido/>").unwrap();
        package.set_attachments(attachments);
        package.set_activities(activities);
        package
    }

    #[tokio::test]
    async fn events_follow_rule_order() {
        let temp = tempdir().unwrap();
        let migrated = at(2018, 11, 20);
        let package = package(
            temp.path(),
            Some(migrated),
            MIGRATION_CREATOR,
            vec![
                attachment(2, Some(migrated), MIGRATION_CREATOR),
                attachment(3, None, MIGRATION_CREATOR),
            ],
            vec![Activity {
                id: 4,
                created_date: Some(at(2019, 5, 5)),
                created_user: None,
            }],
        )
        .await;

        let events = derive_events(&package).await.unwrap();
        let summary: Vec<(EventType, &str)> = events
            .iter()
            .map(|e| (e.event_type, e.detail.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (EventType::Creation, "Object database entry creation"),
                (EventType::Creation, "Multimedia creation"),
                (EventType::Transfer, "Object legacy migration"),
                (EventType::Transfer, "Multimedia legacy migration"),
                (EventType::Creation, "CollectionActivity creation"),
                (EventType::Creation, "LIDO document creation"),
            ]
        );
        assert_eq!(
            events[1].target,
            Some(PathBuf::from("attachments/2/Multimedia.xml"))
        );
        assert_eq!(
            events[4].target,
            Some(PathBuf::from("collection_activities/4/CollectionActivity.xml"))
        );
        assert_eq!(events[5].target, Some(PathBuf::from("reports/lido.xml")));
    }

    #[tokio::test]
    async fn migration_requires_window_and_creator() {
        let temp = tempdir().unwrap();
        let package = package(
            temp.path(),
            Some(at(2018, 12, 1)),
            MIGRATION_CREATOR,
            vec![attachment(2, Some(at(2018, 11, 1)), "someone")],
            vec![],
        )
        .await;

        let events = derive_events(&package).await.unwrap();
        assert!(events.iter().all(|e| e.event_type == EventType::Creation));
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn missing_creation_dates_yield_only_description_event() {
        let temp = tempdir().unwrap();
        let package = package(temp.path(), None, "x", vec![], vec![]).await;

        let mtime = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(package.description_path(), mtime).unwrap();

        let events = derive_events(&package).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp.timestamp(), 1_600_000_000);
    }

    #[tokio::test]
    async fn unloaded_attachments_are_an_error() {
        let temp = tempdir().unwrap();
        let record = Record {
            id: 1,
            title: None,
            created_date: None,
            created_user: None,
            modified_date: None,
            attachment_ids: vec![],
            activity_ids: vec![],
            document: Vec::new(),
        };
        let package = Package::new(temp.path(), record, None);
        assert!(derive_events(&package).await.is_err());
    }
}
