//! File format whitelist
//!
//! Payload files are accepted by extension only. Container archives are
//! expanded before validation and are never accepted as-is.

use serde::{Deserialize, Serialize};
use std::path::Path;

const IMAGE_FORMATS: &[&str] = &["gif", "tif", "tiff", "jpg", "jpeg"];
const DOCUMENT_FORMATS: &[&str] = &["pdf", "odf", "xml"];
const ATTACHMENT_FORMATS: &[&str] = &["attachment"];
const ARCHIVE_FORMATS: &[&str] = &["zip"];

/// Category a payload file falls into based on its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Document,
    /// Attachments whose real type is unknown upstream
    Attachment,
    Archive,
}

impl FileCategory {
    /// Categorize an extension, case-insensitively
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.to_ascii_lowercase();
        let extension = extension.as_str();
        if IMAGE_FORMATS.contains(&extension) {
            Some(Self::Image)
        } else if DOCUMENT_FORMATS.contains(&extension) {
            Some(Self::Document)
        } else if ATTACHMENT_FORMATS.contains(&extension) {
            Some(Self::Attachment)
        } else if ARCHIVE_FORMATS.contains(&extension) {
            Some(Self::Archive)
        } else {
            None
        }
    }

    /// Categorize a path by its extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Whether files of this category may be submitted for preservation
    #[must_use]
    pub fn is_preservable(self) -> bool {
        !matches!(self, Self::Archive)
    }
}

/// Lowercased extension of a path, or an empty string
#[must_use]
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}
