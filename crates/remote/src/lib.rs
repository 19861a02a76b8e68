#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Metadata service access for sipforge
//!
//! This crate handles all HTTP traffic with the collection management
//! service: session key caching, record and attachment retrieval, paged
//! searches, and updates of the preservation log field.

mod cache;
mod client;
mod fields;
mod records;
mod search;
mod session;
pub mod xml;

pub use cache::{cached_document, CachedDocument};
pub use client::{build_http_client, user_agent, RemoteClient};
pub use fields::{append_preservation_entry, PreservationLogEntry};
pub use records::{
    parse_activity, parse_attachment, parse_object, parse_timestamp, DESCRIPTION_DOCUMENT,
};
pub use search::{SearchPager, SearchQuery, SearchResultItem};
pub use session::{CredentialExchange, HttpCredentialExchange, SessionKeyCache};
pub use xml::{Element, VolatileField};

/// Namespace of module documents returned by the service
pub const MODULE_NAMESPACE: &str = "http://www.zetcom.com/ria/ws/module";
