//! Records fetched from the metadata service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Module of the metadata service an entity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Object,
    Multimedia,
    CollectionActivity,
}

impl EntityKind {
    /// Module name used in service URLs and package identifiers
    #[must_use]
    pub fn module_name(self) -> &'static str {
        match self {
            Self::Object => "Object",
            Self::Multimedia => "Multimedia",
            Self::CollectionActivity => "CollectionActivity",
        }
    }

    /// File name of the cached metadata document for this kind
    #[must_use]
    pub fn document_name(self) -> String {
        format!("{}.xml", self.module_name())
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.module_name())
    }
}

/// The primary remote entity a package is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    pub title: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
    pub created_user: Option<String>,
    pub modified_date: Option<DateTime<Utc>>,
    pub attachment_ids: Vec<u64>,
    pub activity_ids: Vec<u64>,
    /// Source document as returned by the service
    #[serde(skip)]
    pub document: Vec<u8>,
}

/// A sub-resource of a record that may carry a binary payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: u64,
    pub filename: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
    pub created_user: Option<String>,
    pub modified_date: Option<DateTime<Utc>>,
}

impl Attachment {
    /// File name used on disk for the payload
    #[must_use]
    pub fn payload_filename(&self) -> String {
        match &self.filename {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("Multimedia_{}.attachment", self.id),
        }
    }
}

/// A related metadata-only sub-resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: u64,
    pub created_date: Option<DateTime<Utc>>,
    pub created_user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSearchResult {
    pub id: u64,
    pub title: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
    pub modified_date: Option<DateTime<Utc>>,
    pub multimedia_ids: Vec<u64>,
    /// Change-detection hash of the record document
    pub xml_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultimediaSearchResult {
    pub id: u64,
    pub filename: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
    pub modified_date: Option<DateTime<Utc>>,
    pub object_ids: Vec<u64>,
    pub xml_hash: String,
}
