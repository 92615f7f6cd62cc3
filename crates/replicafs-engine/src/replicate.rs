//! Replication maintenance batch job

use crate::engine::{Engine, pause};
use crate::lock::REPLICATION_LOCK;
use replicafs_client::ObjectSource;
use replicafs_common::{Error, FileId, NewReplica, Result};
use replicafs_placement::exclusion_set;
use tracing::{error, info, warn};

/// Outcome of one replication run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicationReport {
    /// Another run held the lock; nothing was done
    pub skipped: bool,
    /// Under-replicated files visited
    pub files_examined: usize,
    /// Files left alone because every active host already has a copy
    pub files_without_hosts: usize,
    /// Copies written and indexed
    pub copies_created: usize,
    /// Copies whose transfer failed; retried on the next run
    pub copies_failed: usize,
    /// Copies transferred but not indexed
    pub index_failures: usize,
    /// Why the run stopped before visiting every file
    pub aborted: Option<String>,
}

impl Engine {
    /// Copy existing replicas onto new hosts until each file has
    /// `factor + 1` copies (its first copy plus `factor` additional ones).
    ///
    /// A file is under-replicated while it has at most `factor` live copies.
    /// Per-copy failures are logged and left for the next run. Failing to
    /// resolve a source replica stops the whole run. A partially replicated
    /// file only receives the copies it is missing. The run holds the
    /// replication lock throughout; when the lock is already held the run
    /// is skipped without touching anything.
    pub async fn replicate(&self, factor: usize) -> ReplicationReport {
        let mut report = ReplicationReport::default();
        let _guard = match self.locks.acquire(REPLICATION_LOCK) {
            Ok(guard) => guard,
            Err(Error::AlreadyLocked(key)) => {
                warn!("Replicator: lock '{}' is held, skipping this run", key);
                report.skipped = true;
                return report;
            }
            Err(e) => {
                error!("Replicator: cannot take lock: {}", e);
                report.aborted = Some(e.to_string());
                return report;
            }
        };

        let files = match self.meta.list_under_replicated(factor.saturating_add(1)) {
            Ok(files) => files,
            Err(e) => {
                error!("Replicator: cannot list under-replicated files: {}", e);
                report.aborted = Some(e.to_string());
                return report;
            }
        };
        if !files.is_empty() {
            info!("Replicator: {} under-replicated files", files.len());
        }

        for file_id in files {
            report.files_examined += 1;
            if let Err(e) = self.replicate_file(&file_id, factor, &mut report).await {
                error!("Replicator: can't get source url of {}: {}", file_id, e);
                report.aborted = Some(format!("source of {file_id} unresolvable: {e}"));
                break;
            }
        }
        report
    }

    /// Returns an error only when no source replica can be resolved
    async fn replicate_file(
        &self,
        file_id: &FileId,
        factor: usize,
        report: &mut ReplicationReport,
    ) -> Result<()> {
        let existing = match self.meta.list_replicas_for_file(file_id, false) {
            Ok(existing) => existing,
            Err(e) => {
                warn!("Replicator: cannot load replicas of {}: {}", file_id, e);
                return Ok(());
            }
        };
        if existing.is_empty() {
            // marked deleted since the scan
            return Ok(());
        }

        let holders = exclusion_set(existing.iter().map(|r| &r.host_id));
        let candidates = match self.meta.list_active_hosts(&holders) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Replicator: cannot list hosts for {}: {}", file_id, e);
                return Ok(());
            }
        };
        if candidates.is_empty() {
            warn!("Replicator: no host available for {}", file_id);
            report.files_without_hosts += 1;
            return Ok(());
        }

        let (source, source_host) = self.locate(file_id)?;
        let source_url = source_host.object_url(&source.path);

        let wanted = factor.saturating_add(1).saturating_sub(holders.len());
        if candidates.len() < wanted {
            warn!(
                "Replicator: host is not enough for {}. replicates: {}, hosts: {}",
                file_id,
                wanted,
                candidates.len()
            );
        }

        for dest in candidates.iter().take(wanted) {
            let dest_url = dest.object_url(&source.path);
            info!("Replicate {} > {}", source_url, dest_url);

            let copied = self
                .transport
                .upload(&dest_url, &ObjectSource::Url(source_url.clone()))
                .await;
            match copied {
                Err(e) => {
                    warn!("Replicator: can't replicate {} to {}: {}", source_url, dest_url, e);
                    report.copies_failed += 1;
                }
                Ok(()) => {
                    let replica = NewReplica {
                        file_id: file_id.clone(),
                        host_id: dest.host_id.clone(),
                        path: source.path.clone(),
                        filesize: source.filesize,
                    };
                    if let Err(e) = self.meta.insert_replica(&replica) {
                        error!(
                            "Replicator: {} copied but can not be added to the index: {}",
                            dest_url, e
                        );
                        report.index_failures += 1;
                        pause(self.batch.copy_pause()).await;
                        break;
                    }
                    report.copies_created += 1;
                }
            }
            pause(self.batch.copy_pause()).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::lock::REPLICATION_LOCK;
    use crate::test_support::{FailingInserts, Fixture};
    use replicafs_common::{FileId, HostId, HostStatus, NewReplica};
    use replicafs_meta_store::MetadataStore;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn host_ids(fx: &Fixture, file_id: &FileId) -> Vec<String> {
        fx.meta
            .list_replicas_for_file(file_id, false)
            .unwrap()
            .into_iter()
            .map(|r| r.host_id.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_replicate_reaches_factor_plus_one() {
        let fx = Fixture::new();
        for (id, total) in [("a", 1000), ("b", 900), ("c", 800), ("d", 700)] {
            fx.add_host(id, total);
        }
        let src = fx.source_file("a.bin", &[7u8; 32]);
        let file_id = fx.engine.store(&src, None).await.unwrap();

        let report = fx.engine.replicate(2).await;
        assert_eq!(report.files_examined, 1);
        assert_eq!(report.copies_created, 2);
        assert!(report.aborted.is_none());

        let hosts = host_ids(&fx, &file_id);
        assert_eq!(hosts.len(), 3);
        let distinct: HashSet<_> = hosts.iter().collect();
        assert_eq!(distinct.len(), 3);
        for id in ["a", "b", "c"] {
            assert_eq!(fx.used(id), 32);
        }
        assert_eq!(fx.used("d"), 0);

        // converged: a second run finds nothing to do
        let report = fx.engine.replicate(2).await;
        assert_eq!(report.files_examined, 0);
        assert_eq!(host_ids(&fx, &file_id).len(), 3);
        assert!(!fx.engine.locks().is_locked(REPLICATION_LOCK));
    }

    #[tokio::test]
    async fn test_replicate_unbounded_factor_copies_to_every_host() {
        let fx = Fixture::new();
        fx.add_host("a", 1000);
        fx.add_host("b", 900);
        let src = fx.source_file("a.bin", b"abc");
        let file_id = fx.engine.store(&src, None).await.unwrap();

        let report = fx.engine.replicate(usize::MAX).await;
        assert_eq!(report.files_examined, 1);
        assert_eq!(report.copies_created, 1);
        assert!(report.aborted.is_none());
        assert_eq!(host_ids(&fx, &file_id).len(), 2);
        assert_eq!(fx.used("b"), 3);
    }

    #[tokio::test]
    async fn test_replicate_tops_up_partial_file() {
        let fx = Fixture::new();
        for id in ["a", "b", "c", "d"] {
            fx.add_host(id, 1000);
        }
        let file_id = FileId::new("partial").unwrap();
        fx.transport.put_object("http://a.local:8080/dav/l/a/i/partial", b"xy");
        fx.transport.put_object("http://b.local:8080/dav/l/a/i/partial", b"xy");
        for id in ["a", "b"] {
            fx.meta
                .insert_replica(&NewReplica {
                    file_id: file_id.clone(),
                    host_id: HostId::new(id),
                    path: "/dav/l/a/i/partial".to_string(),
                    filesize: 2,
                })
                .unwrap();
        }

        let report = fx.engine.replicate(2).await;
        assert_eq!(report.copies_created, 1);
        assert_eq!(host_ids(&fx, &file_id).len(), 3);
    }

    #[tokio::test]
    async fn test_replicate_not_enough_hosts() {
        let fx = Fixture::new();
        fx.add_host("a", 1000);
        fx.add_host("b", 500);
        let src = fx.source_file("a.bin", b"abc");
        let file_id = fx.engine.store(&src, None).await.unwrap();

        let report = fx.engine.replicate(3).await;
        assert_eq!(report.copies_created, 1);
        assert_eq!(host_ids(&fx, &file_id).len(), 2);

        // still under-replicated, but every active host holds a copy
        let report = fx.engine.replicate(3).await;
        assert_eq!(report.files_examined, 1);
        assert_eq!(report.files_without_hosts, 1);
        assert_eq!(report.copies_created, 0);

        // new capacity is picked up by the next run
        fx.add_host("c", 100);
        let report = fx.engine.replicate(3).await;
        assert_eq!(report.copies_created, 1);
        assert_eq!(host_ids(&fx, &file_id).len(), 3);
    }

    #[tokio::test]
    async fn test_replicate_transfer_failure_is_retried_next_run() {
        let fx = Fixture::new();
        fx.add_host("a", 1000);
        fx.add_host("b", 900);
        fx.add_host("c", 800);
        let src = fx.source_file("a.bin", b"abcd");
        let file_id = fx.engine.store(&src, None).await.unwrap();

        fx.transport.fail_writes_to("http://b.local:8080");
        let report = fx.engine.replicate(2).await;
        assert_eq!(report.copies_failed, 1);
        assert_eq!(report.copies_created, 1);
        assert!(report.aborted.is_none());
        assert_eq!(fx.used("b"), 0);
        assert_eq!(fx.used("c"), 4);

        fx.transport.clear_failures();
        let report = fx.engine.replicate(2).await;
        assert_eq!(report.copies_created, 1);
        assert_eq!(fx.used("b"), 4);
        assert_eq!(host_ids(&fx, &file_id).len(), 3);
    }

    #[tokio::test]
    async fn test_replicate_skips_when_locked() {
        let fx = Fixture::new();
        fx.add_host("a", 1000);
        fx.add_host("b", 900);
        let src = fx.source_file("a.bin", b"abcd");
        let file_id = fx.engine.store(&src, None).await.unwrap();
        let calls_before = fx.transport.calls().len();

        let guard = fx.engine.locks().acquire(REPLICATION_LOCK).unwrap();
        let report = fx.engine.replicate(1).await;
        assert!(report.skipped);
        assert_eq!(report.files_examined, 0);
        assert_eq!(fx.transport.calls().len(), calls_before);
        assert_eq!(host_ids(&fx, &file_id).len(), 1);
        assert_eq!(fx.used("b"), 0);

        drop(guard);
        let report = fx.engine.replicate(1).await;
        assert!(!report.skipped);
        assert_eq!(host_ids(&fx, &file_id).len(), 2);
    }

    #[tokio::test]
    async fn test_unresolvable_source_aborts_run_and_releases_lock() {
        let fx = Fixture::new();
        fx.add_host("a", 1000);
        fx.add_host("b", 900);
        fx.add_host("c", 800);

        // sorted first: only copy lives on a host that went inactive
        let stranded = FileId::new("aaaa").unwrap();
        let healthy = FileId::new("zzzz").unwrap();
        for (file_id, host) in [(&stranded, "a"), (&healthy, "b")] {
            fx.meta
                .insert_replica(&NewReplica {
                    file_id: file_id.clone(),
                    host_id: HostId::new(host),
                    path: format!("/dav/x/y/z/{file_id}"),
                    filesize: 1,
                })
                .unwrap();
        }
        fx.meta
            .set_host_status(&HostId::new("a"), HostStatus::Inactive)
            .unwrap();

        let report = fx.engine.replicate(1).await;
        assert!(report.aborted.is_some());
        assert_eq!(report.files_examined, 1);
        assert_eq!(report.copies_created, 0);
        assert_eq!(host_ids(&fx, &healthy).len(), 1);
        assert!(!fx.engine.locks().is_locked(REPLICATION_LOCK));
    }

    #[tokio::test]
    async fn test_index_failure_stops_file() {
        let fx = Fixture::new();
        fx.add_host("a", 1000);
        fx.add_host("b", 900);
        fx.add_host("c", 800);
        let src = fx.source_file("a.bin", b"abcd");
        let file_id = fx.engine.store(&src, None).await.unwrap();

        let engine = fx.engine_with_meta(Arc::new(FailingInserts(fx.meta.clone())));
        let report = engine.replicate(2).await;
        assert_eq!(report.index_failures, 1);
        assert_eq!(report.copies_created, 0);
        assert!(report.aborted.is_none());
        // one object copied to b, then the file was abandoned for this run
        assert_eq!(fx.transport.object_count(), 2);
        assert_eq!(host_ids(&fx, &file_id).len(), 1);
    }
}
