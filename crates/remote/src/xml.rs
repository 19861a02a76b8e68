//! Minimal owned XML element tree
//!
//! Only local names are kept. Every document the service returns lives in a
//! single namespace, so prefixes carry no information for us.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sipforge_errors::MetadataError;
use sipforge_hash::{Hash, HashBuilder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// An element excluded from change detection, matched by element name and
/// its `name` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolatileField {
    pub element: String,
    pub name: String,
}

impl VolatileField {
    pub fn new(element: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            name: name.into(),
        }
    }

    /// Fields that change on every save without semantic significance
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("systemField", "__lastModified"),
            Self::new("systemField", "__lastModifiedUser"),
        ]
    }

    fn matches(&self, element: &Element) -> bool {
        element.name == self.element && element.attribute("name") == Some(self.name.as_str())
    }
}

impl Element {
    /// Parse a document and return its root element
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::Malformed` if the document is not well-formed.
    pub fn parse(data: &[u8]) -> Result<Self, MetadataError> {
        let mut reader = Reader::from_reader(data);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(start)) => stack.push(Self::from_start(&start)?),
                Ok(Event::Empty(start)) => {
                    let element = Self::from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| MetadataError::malformed("unbalanced end tag"))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(text)) => {
                    let text = text
                        .unescape()
                        .map_err(|e| MetadataError::malformed(e.to_string()))?;
                    push_text(&mut stack, &text);
                }
                Ok(Event::CData(data)) => {
                    let data = data.into_inner();
                    push_text(&mut stack, &String::from_utf8_lossy(&data));
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(MetadataError::malformed(e.to_string())),
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(MetadataError::malformed("unclosed element"));
        }
        root.ok_or_else(|| MetadataError::malformed("document has no root element"))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self, MetadataError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| MetadataError::malformed(e.to_string()))?;
            let key = attribute.key;
            if key.as_ref() == b"xmlns" || key.as_ref().starts_with(b"xmlns:") {
                continue;
            }
            let value = attribute
                .unescape_value()
                .map_err(|e| MetadataError::malformed(e.to_string()))?;
            attributes.push((
                String::from_utf8_lossy(key.local_name().as_ref()).into_owned(),
                value.into_owned(),
            ));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// Concatenated text of the direct text children
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// All descendant elements in document order, excluding `self`
    #[must_use]
    pub fn descendants(&self) -> Vec<&Element> {
        let mut found = Vec::new();
        let mut pending: Vec<&Element> = self.child_elements().collect();
        pending.reverse();
        while let Some(element) = pending.pop() {
            found.push(element);
            let mut children: Vec<&Element> = element.child_elements().collect();
            children.reverse();
            pending.extend(children);
        }
        found
    }

    /// First descendant with the given name
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.descendants().into_iter().find(|e| e.name == name)
    }

    /// First descendant with the given name and `name` attribute
    #[must_use]
    pub fn find_named(&self, element: &str, name: &str) -> Option<&Element> {
        self.descendants()
            .into_iter()
            .find(|e| e.name == element && e.attribute("name") == Some(name))
    }

    /// Trimmed text of the first `value` descendant, if non-empty
    #[must_use]
    pub fn value(&self) -> Option<String> {
        self.find("value")
            .map(|value| value.text().trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Change-detection hash of this element
    ///
    /// Attributes are sorted, text is trimmed and volatile fields are left
    /// out, so formatting differences and routine saves do not register as
    /// changes.
    #[must_use]
    pub fn change_hash(&self, volatile: &[VolatileField]) -> Hash {
        let mut builder = HashBuilder::new();
        self.write_canonical(volatile, &mut builder);
        builder.finalize()
    }

    fn write_canonical(&self, volatile: &[VolatileField], out: &mut HashBuilder) {
        out.update(b"<").update(self.name.as_bytes());
        let mut attributes: Vec<&(String, String)> = self.attributes.iter().collect();
        attributes.sort();
        for (key, value) in attributes {
            out.update(b" ")
                .update(key.as_bytes())
                .update(b"=\"")
                .update(escape(value.as_str()).as_bytes())
                .update(b"\"");
        }
        out.update(b">");
        for child in &self.children {
            match child {
                Node::Element(element) if volatile.iter().any(|v| v.matches(element)) => {}
                Node::Element(element) => element.write_canonical(volatile, out),
                Node::Text(text) => {
                    out.update(escape(text.trim()).as_bytes());
                }
            }
        }
        out.update(b"</").update(self.name.as_bytes()).update(b">");
    }
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), MetadataError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(element));
    } else if root.is_none() {
        *root = Some(element);
    } else {
        return Err(MetadataError::malformed("multiple root elements"));
    }
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Text(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<application xmlns="http://www.zetcom.com/ria/ws/module">
  <modules>
    <module name="Object" totalSize="1">
      <moduleItem hasAttachments="false" id="1234">
        <systemField dataType="Long" name="__id"><value>1234</value></systemField>
        <systemField dataType="Timestamp" name="__lastModified">
          <value>2019-01-02 03:04:05.678</value>
        </systemField>
        <dataField dataType="Varchar" name="ObjObjectTitleTxt"><value>Teapot &amp; lid</value></dataField>
      </moduleItem>
    </module>
  </modules>
</application>"#;

    #[test]
    fn parses_local_names_and_values() {
        let root = Element::parse(RECORD.as_bytes()).unwrap();
        assert_eq!(root.name, "application");
        let item = root.find("moduleItem").unwrap();
        assert_eq!(item.attribute("id"), Some("1234"));
        let title = item.find_named("dataField", "ObjObjectTitleTxt").unwrap();
        assert_eq!(title.value().as_deref(), Some("Teapot & lid"));
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(Element::parse(b"<a><b></a>").is_err());
        assert!(Element::parse(b"").is_err());
        assert!(Element::parse(b"<a/><b/>").is_err());
    }

    #[test]
    fn volatile_fields_do_not_affect_hash() {
        let original = Element::parse(RECORD.as_bytes()).unwrap();
        let touched = Element::parse(
            RECORD
                .replace("2019-01-02 03:04:05.678", "2024-06-07 08:09:10.000")
                .as_bytes(),
        )
        .unwrap();

        let volatile = VolatileField::defaults();
        assert_eq!(
            original.change_hash(&volatile),
            touched.change_hash(&volatile)
        );
        assert_ne!(original.change_hash(&[]), touched.change_hash(&[]));
    }

    #[test]
    fn non_volatile_changes_alter_hash() {
        let original = Element::parse(RECORD.as_bytes()).unwrap();
        let edited =
            Element::parse(RECORD.replace("Teapot &amp; lid", "Teapot").as_bytes()).unwrap();

        let volatile = VolatileField::defaults();
        assert_ne!(
            original.change_hash(&volatile),
            edited.change_hash(&volatile)
        );
    }

    #[test]
    fn formatting_and_attribute_order_are_ignored() {
        let a = Element::parse(br#"<item b="2" a="1"><value> x </value></item>"#).unwrap();
        let b = Element::parse(br#"<item a="1" b="2"><value>x</value></item>"#).unwrap();
        assert_eq!(a.change_hash(&[]), b.change_hash(&[]));
    }
}
