//! Turning failed tool invocations into preservation errors
//!
//! Detectors are plain values checked in order. Each one filters on the
//! tool subcommand and the extension of the target file (the last
//! argument), then looks for markers in the captured stderr. The tools'
//! report formats are not stable, so nothing beyond substring matching is
//! attempted.

use sipforge_errors::{PreservationError, StageError};
use sipforge_types::format::extension_of;
use std::path::Path;

/// A known failure signature
#[derive(Debug, Clone, Copy)]
pub struct Detector {
    pub code: &'static str,
    pub subcommand: &'static str,
    /// Extensions the target must have; empty matches any target
    pub extensions: &'static [&'static str],
    /// Substrings that must all occur in stderr
    pub markers: &'static [&'static str],
    pub reason: &'static str,
    detail: fn(&str) -> String,
}

impl Detector {
    fn matches(&self, command: &[String], stderr: &str) -> bool {
        if command.first().map(String::as_str) != Some(self.subcommand) {
            return false;
        }
        if !self.extensions.is_empty() {
            let extension = command
                .last()
                .map(|target| extension_of(Path::new(target)))
                .unwrap_or_default();
            if !self.extensions.contains(&extension.as_str()) {
                return false;
            }
        }
        self.markers.iter().all(|marker| stderr.contains(marker))
    }

    fn error(&self, target: &str) -> PreservationError {
        PreservationError::Classified {
            code: self.code.to_string(),
            reason: self.reason.to_string(),
            detail: (self.detail)(target),
        }
    }
}

/// Detectors in evaluation order
pub const DETECTORS: &[Detector] = &[
    Detector {
        code: "tiff-invalid",
        subcommand: "import-object",
        extensions: &[],
        markers: &["Validator returned error", ">TIFF-hul</reportingModule>"],
        reason: "TIFF file failed JHOVE validation",
        detail: |target| {
            format!("TIFF file {target} failed JHOVE validation, and is likely invalid.")
        },
    },
    Detector {
        code: "tiff-multipage",
        subcommand: "import-object",
        extensions: &["tif", "tiff"],
        markers: &[
            "The file contains multiple streams which is supported only for video containers.",
        ],
        reason: "Multi-page TIFF not allowed",
        detail: |target| {
            format!(
                "TIFF file {target} contains multiple pages and is not currently allowed for \
                 preservation."
            )
        },
    },
    Detector {
        code: "jpeg-mime-type",
        subcommand: "import-object",
        extensions: &["jpg", "jpeg"],
        markers: &["MIME type not supported by this scraper."],
        reason: "JPEG MIME type detection failed",
        detail: |target| format!("JPEG file {target} didn't pass MIME type detection"),
    },
    Detector {
        code: "jpeg-mpo",
        subcommand: "import-object",
        extensions: &["jpg", "jpeg"],
        markers: &["Conflict with existing value 'image/jpeg' and new value 'image/mpo'"],
        reason: "MPO JPEG files not supported",
        detail: |target| format!("MPO image file {target} is not supported"),
    },
];

/// Classify a failed stage, or `None` if no detector recognises it
#[must_use]
pub fn classify(failure: &StageError) -> Option<PreservationError> {
    let StageError::Failed {
        command, stderr, ..
    } = failure
    else {
        return None;
    };
    classify_output(command, stderr)
}

/// Classify a command line and its stderr
#[must_use]
pub fn classify_output(command: &[String], stderr: &str) -> Option<PreservationError> {
    let target = command.last().map(String::as_str).unwrap_or_default();
    DETECTORS
        .iter()
        .find(|detector| detector.matches(command, stderr))
        .map(|detector| detector.error(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(target: &str) -> Vec<String> {
        ["import-object", "--base_path", "/p/sip", "--workspace", "/p/workspace", target]
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn code_of(error: Option<PreservationError>) -> Option<String> {
        error.map(|e| e.code().to_string())
    }

    #[test]
    fn invalid_tiff_is_detected_for_any_target() {
        let stderr = "Validator returned error\n<reportingModule>TIFF-hul</reportingModule>";
        let error = classify_output(&import("attachments/1/image.tif"), stderr).unwrap();
        assert_eq!(error.code(), "tiff-invalid");
        assert_eq!(error.reason(), "TIFF file failed JHOVE validation");
        assert!(error.detail().contains("attachments/1/image.tif"));
    }

    #[test]
    fn validator_error_from_other_module_is_unclassified() {
        let stderr = "Validator returned error\n<reportingModule>PDF-hul</reportingModule>";
        assert!(classify_output(&import("doc.pdf"), stderr).is_none());
    }

    #[test]
    fn multipage_tiff_requires_tiff_extension() {
        let stderr =
            "The file contains multiple streams which is supported only for video containers.";
        assert_eq!(
            code_of(classify_output(&import("scan.TIFF"), stderr)),
            Some("tiff-multipage".to_string())
        );
        assert!(classify_output(&import("scan.pdf"), stderr).is_none());
    }

    #[test]
    fn jpeg_detectors() {
        assert_eq!(
            code_of(classify_output(
                &import("photo.jpg"),
                "MIME type not supported by this scraper."
            )),
            Some("jpeg-mime-type".to_string())
        );
        assert_eq!(
            code_of(classify_output(
                &import("photo.jpeg"),
                "Conflict with existing value 'image/jpeg' and new value 'image/mpo'"
            )),
            Some("jpeg-mpo".to_string())
        );
    }

    #[test]
    fn other_subcommands_are_never_classified() {
        let mut command = import("image.tif");
        command[0] = "create-mix".to_string();
        let stderr = "Validator returned error >TIFF-hul</reportingModule>";
        assert!(classify_output(&command, stderr).is_none());
    }

    #[test]
    fn only_failed_stages_are_classified() {
        let failure = StageError::Failed {
            stage: "import-object".to_string(),
            command: import("photo.jpg"),
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "MIME type not supported by this scraper.".to_string(),
        };
        assert_eq!(code_of(classify(&failure)), Some("jpeg-mime-type".to_string()));

        let spawn = StageError::SpawnFailed {
            program: "import-object".to_string(),
            message: "not found".to_string(),
        };
        assert!(classify(&spawn).is_none());
    }
}
