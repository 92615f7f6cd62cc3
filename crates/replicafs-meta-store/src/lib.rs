//! replicafs Metadata Store - host records and the replica index
//!
//! This crate defines the [`MetadataStore`] primitives the placement engine
//! relies on, and a redb-backed implementation ([`MetaStore`]). Replica
//! inserts and deletes apply the owning host's disk accounting delta in the
//! same write transaction.

pub mod store;
pub mod tables;

use replicafs_common::{FileId, Host, HostId, HostStatus, NewReplica, Replica, ReplicaId};
use std::collections::HashSet;

// Re-exports
pub use store::{MetaStore, MetaStoreError, MetaStoreResult};

/// Metadata primitives required by the placement engine.
pub trait MetadataStore: Send + Sync {
    /// Active hosts not in `exclude`, most free capacity first
    fn list_active_hosts(&self, exclude: &HashSet<HostId>) -> MetaStoreResult<Vec<Host>>;

    /// A host record regardless of its status
    fn get_host(&self, host_id: &HostId) -> MetaStoreResult<Option<Host>>;

    /// Register or replace a host record
    fn put_host(&self, host: &Host) -> MetaStoreResult<()>;

    /// Every registered host, ordered by host id
    fn list_hosts(&self) -> MetaStoreResult<Vec<Host>>;

    /// Change a host's status
    fn set_host_status(&self, host_id: &HostId, status: HostStatus) -> MetaStoreResult<Host>;

    /// Record a replica and add its size to the host's `disk_used`
    fn insert_replica(&self, replica: &NewReplica) -> MetaStoreResult<Replica>;

    /// Stamp `deleted_at` on every live replica of a file.
    ///
    /// Returns how many rows changed; zero when the file has no live replica.
    fn mark_replicas_deleted(&self, file_id: &FileId, deleted_at: u64) -> MetaStoreResult<usize>;

    /// Files with at least one and fewer than `threshold` live replicas
    fn list_under_replicated(&self, threshold: usize) -> MetaStoreResult<Vec<FileId>>;

    /// Replicas of a file, oldest first
    fn list_replicas_for_file(
        &self,
        file_id: &FileId,
        include_deleted: bool,
    ) -> MetaStoreResult<Vec<Replica>>;

    /// Every replica with a `deleted_at` stamp
    fn list_soft_deleted_replicas(&self) -> MetaStoreResult<Vec<Replica>>;

    /// Remove a soft-deleted replica row and subtract its size from the
    /// host's `disk_used`
    fn delete_replica_row(&self, id: &ReplicaId) -> MetaStoreResult<Replica>;
}
