//! Reading and updating single fields of an Object record

use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use sipforge_errors::{Error, MetadataError};
use sipforge_types::EntityKind;
use tracing::debug;

use crate::client::RemoteClient;
use crate::xml::Element;
use crate::MODULE_NAMESPACE;

/// One entry of the preservation log kept on the Object record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreservationLogEntry {
    pub filename: String,
    pub status: String,
    pub object_modify_date: Option<String>,
    pub date: String,
}

impl RemoteClient {
    /// Current value of the named field on an Object, if it is set
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn get_object_field(&self, object_id: u64, name: &str) -> Result<Option<String>, Error> {
        let document = self
            .fetch_record_document(EntityKind::Object, object_id)
            .await?;
        let root = Element::parse(&document)?;
        Ok(root
            .descendants()
            .into_iter()
            .find(|e| e.name != "moduleReference" && e.attribute("name") == Some(name))
            .and_then(Element::value))
    }

    /// Replace the value of the named field on an Object
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn set_object_field(
        &self,
        object_id: u64,
        name: &str,
        field_type: &str,
        value: &str,
    ) -> Result<(), Error> {
        let body = field_update_document(object_id, name, field_type, value);
        let path = format!(
            "{}/{name}",
            Self::record_path(EntityKind::Object, object_id)
        );
        debug!(object_id, field = name, "updating object field");
        self.put_xml(&path, body.into_bytes()).await
    }
}

fn field_update_document(object_id: u64, name: &str, field_type: &str, value: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<application xmlns="{MODULE_NAMESPACE}">
  <modules>
    <module name="Object">
      <moduleItem id="{object_id}">
        <{field_type} name="{name}">
          <value>{value}</value>
        </{field_type}>
      </moduleItem>
    </module>
  </modules>
</application>"#,
        name = escape(name),
        value = escape(value),
    )
}

/// Append `entry` to the JSON preservation log stored in the named field
///
/// An empty field starts a new log.
///
/// # Errors
///
/// Returns a `MetadataError` if the stored log is not a JSON array, or any
/// request error.
pub async fn append_preservation_entry(
    client: &RemoteClient,
    object_id: u64,
    field_name: &str,
    field_type: &str,
    entry: PreservationLogEntry,
) -> Result<(), Error> {
    let current = client.get_object_field(object_id, field_name).await?;
    let updated = appended_log(current.as_deref(), entry)?;
    client
        .set_object_field(object_id, field_name, field_type, &updated)
        .await
}

fn appended_log(current: Option<&str>, entry: PreservationLogEntry) -> Result<String, Error> {
    let mut entries: Vec<PreservationLogEntry> = match current {
        Some(text) if !text.trim().is_empty() => serde_json::from_str(text).map_err(|e| {
            MetadataError::malformed(format!("preservation log is not a JSON array: {e}"))
        })?,
        _ => Vec::new(),
    };
    entries.push(entry);
    Ok(serde_json::to_string(&entries)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(filename: &str) -> PreservationLogEntry {
        PreservationLogEntry {
            filename: filename.to_string(),
            status: "accepted".to_string(),
            object_modify_date: Some("2021-03-04T05:06:07+00:00".to_string()),
            date: "2021-03-05T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn empty_field_starts_new_log() {
        let log = appended_log(None, entry("a.tar")).unwrap();
        let parsed: Vec<PreservationLogEntry> = serde_json::from_str(&log).unwrap();
        assert_eq!(parsed, vec![entry("a.tar")]);

        let log = appended_log(Some("  "), entry("a.tar")).unwrap();
        assert_eq!(serde_json::from_str::<Vec<PreservationLogEntry>>(&log).unwrap().len(), 1);
    }

    #[test]
    fn existing_entries_are_kept_in_order() {
        let first = appended_log(None, entry("a.tar")).unwrap();
        let second = appended_log(Some(&first), entry("b.tar")).unwrap();
        let parsed: Vec<PreservationLogEntry> = serde_json::from_str(&second).unwrap();
        assert_eq!(parsed, vec![entry("a.tar"), entry("b.tar")]);
    }

    #[test]
    fn garbage_log_is_rejected() {
        let err = appended_log(Some("not json"), entry("a.tar")).unwrap_err();
        assert!(matches!(err, Error::Metadata(_)));
    }

    #[test]
    fn update_document_escapes_value() {
        let xml = field_update_document(7, "ObjPreservationLog", "dataField", r#"[{"a":"<b>"}]"#);
        let root = Element::parse(xml.as_bytes()).unwrap();
        let item = root.find("moduleItem").unwrap();
        assert_eq!(item.attribute("id"), Some("7"));
        let field = item.find_named("dataField", "ObjPreservationLog").unwrap();
        assert_eq!(field.value().as_deref(), Some(r#"[{"a":"<b>"}]"#));
    }
}
