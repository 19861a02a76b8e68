//! Paged searches over a module

use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use sipforge_errors::Error;
use sipforge_types::{EntityKind, MultimediaSearchResult, ObjectSearchResult};
use std::marker::PhantomData;
use tracing::debug;

use crate::client::RemoteClient;
use crate::records::{field, item_id, reference_ids, timestamp_field};
use crate::xml::{Element, VolatileField};

/// Namespace of search request documents
pub const SEARCH_NAMESPACE: &str = "http://www.zetcom.com/ria/ws/module/search";

/// One page of a search ordered by ascending id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub kind: EntityKind,
    pub limit: usize,
    pub offset: usize,
    /// Only records modified at or after this time, or never modified
    pub modified_since: Option<DateTime<Utc>>,
}

impl SearchQuery {
    #[must_use]
    pub fn to_xml(&self) -> String {
        let module = self.kind.module_name();
        let expert = self
            .modified_since
            .map(|since| {
                let operand = escape(since.to_rfc3339()).into_owned();
                format!(
                    r#"
        <expert module="{module}">
          <or>
            <greaterEquals fieldPath="__lastModified" operand="{operand}"/>
            <isNull fieldPath="__lastModified"/>
          </or>
        </expert>"#
                )
            })
            .unwrap_or_default();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<application xmlns="{SEARCH_NAMESPACE}">
  <modules>
    <module name="{module}">
      <search limit="{limit}" offset="{offset}">
        <sort>
          <field fieldPath="__id" direction="Ascending"/>
        </sort>{expert}
      </search>
    </module>
  </modules>
</application>"#,
            limit = self.limit,
            offset = self.offset,
        )
    }
}

/// A search result built from a single `moduleItem`
pub trait SearchResultItem: Sized {
    const KIND: EntityKind;

    /// # Errors
    ///
    /// Returns a `MetadataError` if the item lacks an id or has malformed
    /// timestamps.
    fn from_module_item(item: &Element, xml_hash: String) -> Result<Self, Error>;
}

impl SearchResultItem for ObjectSearchResult {
    const KIND: EntityKind = EntityKind::Object;

    fn from_module_item(item: &Element, xml_hash: String) -> Result<Self, Error> {
        Ok(Self {
            id: item_id(item)?,
            title: field(item, "virtualField", "ObjObjectVrt")
                .or_else(|| field(item, "dataField", "ObjObjectTitleTxt")),
            created_date: timestamp_field(item, "__created")?,
            modified_date: timestamp_field(item, "__lastModified")?,
            multimedia_ids: reference_ids(item, "ObjMultimediaRef"),
            xml_hash,
        })
    }
}

impl SearchResultItem for MultimediaSearchResult {
    const KIND: EntityKind = EntityKind::Multimedia;

    fn from_module_item(item: &Element, xml_hash: String) -> Result<Self, Error> {
        Ok(Self {
            id: item_id(item)?,
            filename: field(item, "dataField", "MulOriginalFileTxt"),
            created_date: timestamp_field(item, "__created")?,
            modified_date: timestamp_field(item, "__lastModified")?,
            object_ids: reference_ids(item, "MulObjectRef"),
            xml_hash,
        })
    }
}

/// Iterates over search results one page at a time until an empty page
pub struct SearchPager<'a, T> {
    client: &'a RemoteClient,
    query: SearchQuery,
    volatile: Vec<VolatileField>,
    exhausted: bool,
    _item: PhantomData<T>,
}

impl<'a, T: SearchResultItem> SearchPager<'a, T> {
    #[must_use]
    pub fn new(
        client: &'a RemoteClient,
        limit: usize,
        offset: usize,
        modified_since: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            client,
            query: SearchQuery {
                kind: T::KIND,
                limit: limit.max(1),
                offset,
                modified_since,
            },
            volatile: VolatileField::defaults(),
            exhausted: false,
            _item: PhantomData,
        }
    }

    /// Also exclude this field from the change-detection hash
    #[must_use]
    pub fn with_volatile_field(mut self, field: VolatileField) -> Self {
        self.volatile.push(field);
        self
    }

    /// Fetch the next page; `None` once the results are exhausted
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>, Error> {
        if self.exhausted {
            return Ok(None);
        }

        let path = format!("module/{}/search", self.query.kind.module_name());
        debug!(offset = self.query.offset, limit = self.query.limit, "searching {path}");
        let body = self
            .client
            .post_xml(&path, self.query.to_xml().into_bytes())
            .await?;
        let root = Element::parse(&body)?;

        let results = root
            .descendants()
            .into_iter()
            .filter(|e| e.name == "moduleItem")
            .map(|item| T::from_module_item(item, item.change_hash(&self.volatile).to_hex()))
            .collect::<Result<Vec<_>, _>>()?;

        if results.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        self.query.offset += self.query.limit;
        Ok(Some(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn plain_query_has_no_filter() {
        let query = SearchQuery {
            kind: EntityKind::Object,
            limit: 100,
            offset: 200,
            modified_since: None,
        };
        let xml = query.to_xml();
        assert!(xml.contains(r#"<module name="Object">"#));
        assert!(xml.contains(r#"<search limit="100" offset="200">"#));
        assert!(xml.contains(r#"fieldPath="__id" direction="Ascending""#));
        assert!(!xml.contains("expert"));
        assert!(Element::parse(xml.as_bytes()).is_ok());
    }

    #[test]
    fn modified_filter_includes_never_modified() {
        let since = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        let query = SearchQuery {
            kind: EntityKind::Multimedia,
            limit: 10,
            offset: 0,
            modified_since: Some(since),
        };
        let root = Element::parse(query.to_xml().as_bytes()).unwrap();
        let expert = root.find("expert").unwrap();
        assert_eq!(expert.attribute("module"), Some("Multimedia"));
        let gte = expert.find("greaterEquals").unwrap();
        assert_eq!(gte.attribute("operand"), Some("2020-01-02T03:04:05+00:00"));
        assert_eq!(
            expert.find("isNull").and_then(|e| e.attribute("fieldPath")),
            Some("__lastModified")
        );
    }
}
