//! The placement engine and its collaborators

use crate::lock::LockManager;
use replicafs_client::ObjectTransport;
use replicafs_common::config::BatchConfig;
use replicafs_common::{Error, FileId, Host, HostId, Replica, Result};
use replicafs_meta_store::{MetaStoreError, MetadataStore};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Decides where copies of a file live and keeps the index in step with
/// the storage hosts.
///
/// All state lives in the metadata store; the engine itself only holds
/// handles to its collaborators.
pub struct Engine {
    pub(crate) meta: Arc<dyn MetadataStore>,
    pub(crate) transport: Arc<dyn ObjectTransport>,
    pub(crate) locks: LockManager,
    pub(crate) batch: BatchConfig,
}

impl Engine {
    /// Create an engine; batch locks live under `batch.lock_dir`
    pub fn new(
        meta: Arc<dyn MetadataStore>,
        transport: Arc<dyn ObjectTransport>,
        batch: BatchConfig,
    ) -> Self {
        Self {
            meta,
            transport,
            locks: LockManager::new(&batch.lock_dir),
            batch,
        }
    }

    /// The lock markers guarding the batch jobs
    #[must_use]
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Placement candidates, most free capacity first
    pub fn hosts(&self, exclude: &HashSet<HostId>) -> Result<Vec<Host>> {
        self.meta.list_active_hosts(exclude).map_err(meta_error)
    }

    /// First live replica of `file_id` whose host is active, with that host
    pub(crate) fn locate(&self, file_id: &FileId) -> Result<(Replica, Host)> {
        let replicas = self
            .meta
            .list_replicas_for_file(file_id, false)
            .map_err(meta_error)?;
        for replica in replicas {
            match self.meta.get_host(&replica.host_id).map_err(meta_error)? {
                Some(host) if host.status.is_active() => return Ok((replica, host)),
                _ => {}
            }
        }
        Err(Error::not_found(file_id.to_string()))
    }
}

pub(crate) fn meta_error(e: MetaStoreError) -> Error {
    Error::metadata(e.to_string())
}

pub(crate) async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
