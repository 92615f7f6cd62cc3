//! replicafs Client - object transport to storage hosts
//!
//! This crate provides the [`ObjectTransport`] abstraction and its WebDAV
//! implementation used to move replicas between hosts.

pub mod transport;
pub mod webdav;

// Re-exports
pub use transport::{
    ObjectSource, ObjectTransport, TransportError, TransportResult, collection_urls,
};
pub use webdav::WebDavClient;
