//! Integration tests for types

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use sipforge_types::format::extension_of;
    use sipforge_types::*;
    use std::path::Path;

    #[test]
    fn test_whitelist_is_case_insensitive() {
        assert_eq!(FileCategory::from_path(Path::new("a/SCAN.TIF")), Some(FileCategory::Image));
        assert_eq!(FileCategory::from_path(Path::new("report.Pdf")), Some(FileCategory::Document));
        assert_eq!(
            FileCategory::from_path(Path::new("Multimedia_3.attachment")),
            Some(FileCategory::Attachment)
        );
        assert_eq!(FileCategory::from_path(Path::new("bundle.ZIP")), Some(FileCategory::Archive));
        assert_eq!(FileCategory::from_path(Path::new("setup.exe")), None);
        assert_eq!(FileCategory::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_archives_are_not_preservable() {
        assert!(FileCategory::Image.is_preservable());
        assert!(FileCategory::Attachment.is_preservable());
        assert!(!FileCategory::Archive.is_preservable());
        assert_eq!(extension_of(Path::new("x/y.JPEG")), "jpeg");
        assert_eq!(extension_of(Path::new("noext")), "");
    }

    #[test]
    fn test_entity_kind_names() {
        assert_eq!(EntityKind::CollectionActivity.module_name(), "CollectionActivity");
        assert_eq!(EntityKind::Multimedia.document_name(), "Multimedia.xml");
        assert_eq!(EntityKind::Object.to_string(), "Object");
    }

    #[test]
    fn test_provenance_event_builder() {
        let timestamp = Utc.with_ymd_and_hms(2018, 11, 5, 9, 0, 0).unwrap();
        let event = ProvenanceEvent::success(EventType::Transfer, timestamp, "Object legacy migration")
            .with_target("reports/Object.xml")
            .with_outcome_detail("migrated");

        assert_eq!(event.outcome, EventOutcome::Success);
        assert_eq!(event.event_type.as_str(), "transfer");
        assert_eq!(event.target.as_deref(), Some(Path::new("reports/Object.xml")));
        assert_eq!(event.outcome_detail.as_deref(), Some("migrated"));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&RecordStatus::Update).unwrap();
        assert_eq!(json, r#""update""#);
        assert_eq!(RecordStatus::default(), RecordStatus::Submission);
        assert_eq!(SubmissionOutcome::Rejected.to_string(), "rejected");
    }
}
