//! Soft deletion and the erase batch job

use crate::engine::{Engine, meta_error, pause};
use crate::lock::ERASE_LOCK;
use replicafs_common::{Error, FileId, Result, current_timestamp};
use tracing::{error, info, warn};

/// Outcome of one erase run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EraseReport {
    /// Another run held the lock; nothing was done
    pub skipped: bool,
    /// Soft-deleted replicas visited
    pub examined: usize,
    /// Replicas removed from their host and from the index
    pub erased: usize,
    /// Replicas left in place for the next run
    pub failed: usize,
    /// Sum of `filesize` over erased replicas
    pub bytes_reclaimed: u64,
    /// Why the run stopped before visiting every replica
    pub aborted: Option<String>,
}

impl Engine {
    /// Mark every live replica of `file_id` as deleted.
    ///
    /// Objects stay on their hosts until the next [`erase`](Self::erase) run.
    /// Returns the number of replicas marked; an unknown file marks none.
    pub fn mark_deleted(&self, file_id: &str) -> Result<usize> {
        if file_id.is_empty() {
            return Err(Error::invalid_argument("file id must not be empty"));
        }
        let file_id = FileId::new(file_id)?;
        let marked = self
            .meta
            .mark_replicas_deleted(&file_id, current_timestamp())
            .map_err(meta_error)?;
        if marked == 0 {
            warn!("Delete {}: no live replica", file_id);
        } else {
            info!("Delete {}: {} replicas marked", file_id, marked);
        }
        Ok(marked)
    }

    /// Physically remove every soft-deleted replica, then its index row.
    ///
    /// A replica whose removal fails keeps its row and is retried on the
    /// next run. An index failure after a successful removal stops the run.
    pub async fn erase(&self) -> EraseReport {
        let mut report = EraseReport::default();
        let _guard = match self.locks.acquire(ERASE_LOCK) {
            Ok(guard) => guard,
            Err(Error::AlreadyLocked(key)) => {
                warn!("Eraser: lock '{}' is held, skipping this run", key);
                report.skipped = true;
                return report;
            }
            Err(e) => {
                error!("Eraser: cannot take lock: {}", e);
                report.aborted = Some(e.to_string());
                return report;
            }
        };

        let replicas = match self.meta.list_soft_deleted_replicas() {
            Ok(replicas) => replicas,
            Err(e) => {
                error!("Eraser: cannot list deleted replicas: {}", e);
                report.aborted = Some(e.to_string());
                return report;
            }
        };

        for replica in replicas {
            report.examined += 1;
            let host = match self.meta.get_host(&replica.host_id) {
                Ok(Some(host)) => host,
                Ok(None) => {
                    warn!(
                        "Eraser: host {} of replica {} is not registered",
                        replica.host_id, replica.id
                    );
                    report.failed += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Eraser: cannot load host {}: {}", replica.host_id, e);
                    report.failed += 1;
                    continue;
                }
            };

            let url = host.object_url(&replica.path);
            info!("Erase {}", url);
            match self.transport.delete(&url).await {
                Err(e) => {
                    warn!("Eraser: can't delete {}: {}", url, e);
                    report.failed += 1;
                }
                Ok(()) => {
                    if let Err(e) = self.meta.delete_replica_row(&replica.id) {
                        error!("Eraser: {} deleted but its row remains: {}", url, e);
                        report.aborted =
                            Some(format!("index update for {} failed: {e}", replica.id));
                        break;
                    }
                    report.erased += 1;
                    report.bytes_reclaimed += replica.filesize;
                }
            }
            pause(self.batch.erase_pause()).await;
        }
        report
    }
}
