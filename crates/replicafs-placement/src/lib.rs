//! replicafs Placement - host ranking and storage path layout
//!
//! This crate decides where a copy of a file goes: which storage host
//! receives it ([`rank_hosts`]) and under which host-relative path it is
//! written ([`storage_path`]).
//!
//! # Example
//! ```ignore
//! use replicafs_placement::{rank_hosts, storage_path};
//!
//! let ranked = rank_hosts(hosts, &HashSet::new());
//! let path = storage_path(&file_id, &ranked[0].root_path, source, Some("a.jpg"));
//! ```

pub mod path;
pub mod selector;

pub use path::{extension, object_name, storage_path};
pub use selector::{exclusion_set, rank_hosts};
