//! Record documents: parsing and retrieval

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sipforge_errors::{Error, MetadataError};
use sipforge_types::{Activity, Attachment, EntityKind, Record};
use std::path::Path;
use tracing::debug;

use crate::client::RemoteClient;
use crate::xml::Element;

/// File name of the descriptive metadata export inside `reports/`
pub const DESCRIPTION_DOCUMENT: &str = "lido.xml";

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a timestamp as reported by the service
///
/// Naive timestamps are taken to be UTC.
///
/// # Errors
///
/// Returns `MetadataError::InvalidTimestamp` if no known format matches.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, MetadataError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed.and_utc());
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }
    Err(MetadataError::InvalidTimestamp {
        value: value.to_string(),
    })
}

/// The `moduleItem` of a single-record document
fn module_item(root: &Element) -> Result<&Element, MetadataError> {
    root.descendants()
        .into_iter()
        .find(|e| e.name == "moduleItem" && e.attribute("id").is_some())
        .ok_or_else(|| MetadataError::missing("moduleItem"))
}

pub(crate) fn item_id(item: &Element) -> Result<u64, MetadataError> {
    let id = item
        .attribute("id")
        .ok_or_else(|| MetadataError::missing("moduleItem/@id"))?;
    id.trim()
        .parse()
        .map_err(|_| MetadataError::malformed(format!("invalid module item id {id:?}")))
}

pub(crate) fn field(item: &Element, kind: &str, name: &str) -> Option<String> {
    item.find_named(kind, name).and_then(Element::value)
}

pub(crate) fn timestamp_field(
    item: &Element,
    name: &str,
) -> Result<Option<DateTime<Utc>>, MetadataError> {
    field(item, "systemField", name)
        .map(|value| parse_timestamp(&value))
        .transpose()
}

/// Ids referenced through the named `moduleReference`, in document order
pub(crate) fn reference_ids(item: &Element, reference: &str) -> Vec<u64> {
    item.find_named("moduleReference", reference)
        .map(|reference| {
            reference
                .descendants()
                .into_iter()
                .filter(|e| e.name == "moduleReferenceItem")
                .filter_map(|e| e.attribute("moduleItemId"))
                .filter_map(|id| id.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// A record whose `moduleItem` holds nothing but system fields was cut down
/// by the service's permission filter.
fn ensure_complete(item: &Element, kind: EntityKind, id: u64) -> Result<(), MetadataError> {
    if item.child_elements().any(|child| child.name != "systemField") {
        Ok(())
    } else {
        Err(MetadataError::Truncated {
            kind: kind.module_name().to_string(),
            id,
        })
    }
}

/// Parse an Object document
///
/// # Errors
///
/// Returns a `MetadataError` if the document is malformed or truncated.
pub fn parse_object(document: &[u8]) -> Result<Record, Error> {
    let root = Element::parse(document)?;
    let item = module_item(&root)?;
    let id = item_id(item)?;
    ensure_complete(item, EntityKind::Object, id)?;

    Ok(Record {
        id,
        title: field(item, "dataField", "ObjObjectTitleTxt")
            .or_else(|| field(item, "virtualField", "ObjObjectVrt")),
        created_date: timestamp_field(item, "__created")?,
        created_user: field(item, "systemField", "__createdUser"),
        modified_date: timestamp_field(item, "__lastModified")?,
        attachment_ids: reference_ids(item, "ObjMultimediaRef"),
        activity_ids: reference_ids(item, "ObjCollectionActivityRef"),
        document: document.to_vec(),
    })
}

/// Parse a Multimedia document
///
/// # Errors
///
/// Returns a `MetadataError` if the document is malformed.
pub fn parse_attachment(document: &[u8]) -> Result<Attachment, Error> {
    let root = Element::parse(document)?;
    let item = module_item(&root)?;

    Ok(Attachment {
        id: item_id(item)?,
        filename: field(item, "dataField", "MulOriginalFileTxt"),
        created_date: timestamp_field(item, "__created")?,
        created_user: field(item, "systemField", "__createdUser"),
        modified_date: timestamp_field(item, "__lastModified")?,
    })
}

/// Parse a `CollectionActivity` document
///
/// # Errors
///
/// Returns a `MetadataError` if the document is malformed.
pub fn parse_activity(document: &[u8]) -> Result<Activity, Error> {
    let root = Element::parse(document)?;
    let item = module_item(&root)?;

    Ok(Activity {
        id: item_id(item)?,
        created_date: timestamp_field(item, "__created")?,
        created_user: field(item, "systemField", "__createdUser"),
    })
}

impl RemoteClient {
    /// Path of a single record relative to the service root
    #[must_use]
    pub fn record_path(kind: EntityKind, id: u64) -> String {
        format!("module/{}/{id}", kind.module_name())
    }

    /// Retrieve the raw document of a single record
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the service responds with an
    /// error status.
    pub async fn fetch_record_document(&self, kind: EntityKind, id: u64) -> Result<Vec<u8>, Error> {
        self.get_xml(&Self::record_path(kind, id)).await
    }

    /// Retrieve and parse an Object record
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::Truncated` if the account cannot read the
    /// record's fields, or any request error.
    pub async fn fetch_object(&self, id: u64) -> Result<Record, Error> {
        let document = self.fetch_record_document(EntityKind::Object, id).await?;
        parse_object(&document)
    }

    /// Download the binary payload of a Multimedia record into `dest`
    ///
    /// Returns the payload size, or `None` if the record has no payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the request or any file operation fails.
    pub async fn download_attachment(&self, id: u64, dest: &Path) -> Result<Option<u64>, Error> {
        let path = format!(
            "{}/attachment",
            Self::record_path(EntityKind::Multimedia, id)
        );
        let size = self.download(&path, dest).await?;
        if size.is_none() {
            debug!(attachment_id = id, "attachment has no payload");
        }
        Ok(size)
    }

    /// Path of the descriptive metadata export for an Object
    #[must_use]
    pub fn description_path(object_id: u64, report_id: u64) -> String {
        format!(
            "{}/export/{report_id}",
            Self::record_path(EntityKind::Object, object_id)
        )
    }
}
