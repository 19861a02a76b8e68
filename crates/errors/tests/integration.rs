//! Integration tests for error types

#[cfg(test)]
mod tests {
    use sipforge_errors::*;

    #[test]
    fn test_error_conversion() {
        let net_err = NetworkError::Timeout {
            url: "https://example.com".into(),
        };
        let err: Error = net_err.into();
        assert!(matches!(err, Error::Network(_)));
        assert!(!err.is_domain());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_only_preservation_errors_are_domain_errors() {
        let err: Error = PreservationError::UnsupportedFormat {
            extension: "exe".into(),
            sip_filename: "20210615_Object_7.tar".into(),
        }
        .into();
        assert!(err.is_domain());
        assert_eq!(err.user_code(), Some("preservation.unsupported_format"));

        let stage: Error = StageError::Failed {
            stage: "import-object".into(),
            command: vec!["import-object".into()],
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "boom".into(),
        }
        .into();
        assert!(!stage.is_domain());
        assert!(stage.as_preservation().is_none());
    }

    #[test]
    fn test_preservation_display_joins_reason_and_detail() {
        let err = PreservationError::Classified {
            code: "jpeg-mpo".into(),
            reason: "MPO JPEG files not supported".into(),
            detail: "MPO image file a.jpg is not supported".into(),
        };
        assert_eq!(
            err.to_string(),
            "MPO JPEG files not supported\n\nMPO image file a.jpg is not supported"
        );
        assert_eq!(err.reason(), "MPO JPEG files not supported");
        assert_eq!(err.code(), "jpeg-mpo");
    }

    #[test]
    fn test_error_clone() {
        let err = MetadataError::Truncated {
            kind: "Object".into(),
            id: 7,
        };
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }

    #[test]
    fn test_io_error_keeps_kind_and_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let err = Error::io_with_path(&io_err, "/packages/7");
        assert!(err.is_io_kind(std::io::ErrorKind::PermissionDenied));
        match err {
            Error::Io { path, .. } => {
                assert_eq!(path, Some(std::path::PathBuf::from("/packages/7")));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let storage_err: StorageError = std::io::Error::other("disk").into();
        assert!(matches!(storage_err, StorageError::Io { .. }));
    }
}
