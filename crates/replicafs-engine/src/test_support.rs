//! In-memory transport and engine fixture for the engine tests

use crate::engine::Engine;
use async_trait::async_trait;
use parking_lot::Mutex;
use replicafs_client::{ObjectSource, ObjectTransport, TransportError, TransportResult};
use replicafs_common::config::BatchConfig;
use replicafs_common::{FileId, Host, HostId, HostStatus, NewReplica, Replica, ReplicaId};
use replicafs_meta_store::{MetaStore, MetaStoreError, MetaStoreResult, MetadataStore};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Object hosts simulated as one map from URL to bytes
#[derive(Default)]
pub struct MemoryTransport {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<String>>,
    failing_writes: Mutex<Vec<String>>,
    failing_deletes: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub fn object(&self, url: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(url).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn put_object(&self, url: &str, data: &[u8]) {
        self.objects.lock().insert(url.to_string(), data.to_vec());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Writes to URLs starting with `prefix` answer 507
    pub fn fail_writes_to(&self, prefix: &str) {
        self.failing_writes.lock().push(prefix.to_string());
    }

    /// Deletes of URLs starting with `prefix` answer 503
    pub fn fail_deletes_to(&self, prefix: &str) {
        self.failing_deletes.lock().push(prefix.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_writes.lock().clear();
        self.failing_deletes.lock().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

fn matches_any(prefixes: &Mutex<Vec<String>>, url: &str) -> bool {
    prefixes.lock().iter().any(|p| url.starts_with(p.as_str()))
}

#[async_trait]
impl ObjectTransport for MemoryTransport {
    async fn create_collection(&self, url: &str) -> TransportResult<()> {
        self.record(format!("MKCOL {url}"));
        Ok(())
    }

    async fn write(&self, url: &str, source: &ObjectSource) -> TransportResult<()> {
        self.record(format!("PUT {url}"));
        if matches_any(&self.failing_writes, url) {
            return Err(TransportError::Status {
                method: "PUT",
                url: url.to_string(),
                status: 507,
            });
        }
        let data = match source {
            ObjectSource::File(path) => {
                std::fs::read(path).map_err(|e| TransportError::Source {
                    path: path.display().to_string(),
                    source: e,
                })?
            }
            ObjectSource::Url(src) => self.object(src).ok_or_else(|| TransportError::Status {
                method: "GET",
                url: src.clone(),
                status: 404,
            })?,
        };
        self.objects.lock().insert(url.to_string(), data);
        Ok(())
    }

    async fn delete(&self, url: &str) -> TransportResult<()> {
        self.record(format!("DELETE {url}"));
        if matches_any(&self.failing_deletes, url) {
            return Err(TransportError::Status {
                method: "DELETE",
                url: url.to_string(),
                status: 503,
            });
        }
        self.objects.lock().remove(url);
        Ok(())
    }
}

/// An engine over a temporary redb store and a [`MemoryTransport`]
pub struct Fixture {
    pub dir: TempDir,
    pub meta: Arc<MetaStore>,
    pub transport: Arc<MemoryTransport>,
    pub engine: Engine,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let meta = Arc::new(MetaStore::open(dir.path().join("meta.redb")).unwrap());
        let transport = Arc::new(MemoryTransport::default());
        let engine = Engine::new(meta.clone(), transport.clone(), batch_config(&dir));
        Self {
            dir,
            meta,
            transport,
            engine,
        }
    }

    /// A second engine sharing the transport and lock directory
    pub fn engine_with_meta(&self, meta: Arc<dyn MetadataStore>) -> Engine {
        Engine::new(meta, self.transport.clone(), batch_config(&self.dir))
    }

    /// Register an active host `<id>.local:8080` storing under `/dav`
    pub fn add_host(&self, id: &str, disk_total: u64) {
        self.meta
            .put_host(&Host {
                host_id: HostId::new(id),
                hostname: format!("{id}.local"),
                port: Some(8080),
                root_path: "/dav".to_string(),
                status: HostStatus::Active,
                disk_total,
                disk_used: 0,
            })
            .unwrap();
    }

    pub fn used(&self, id: &str) -> u64 {
        self.meta.get_host(&HostId::new(id)).unwrap().unwrap().disk_used
    }

    pub fn source_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join("src").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }
}

fn batch_config(dir: &TempDir) -> BatchConfig {
    BatchConfig {
        lock_dir: dir.path().join("locks"),
        copy_pause_ms: 0,
        erase_pause_ms: 0,
        ..BatchConfig::default()
    }
}

/// A store whose replica inserts always fail
pub struct FailingInserts(pub Arc<MetaStore>);

impl MetadataStore for FailingInserts {
    fn list_active_hosts(&self, exclude: &HashSet<HostId>) -> MetaStoreResult<Vec<Host>> {
        self.0.list_active_hosts(exclude)
    }

    fn get_host(&self, host_id: &HostId) -> MetaStoreResult<Option<Host>> {
        self.0.get_host(host_id)
    }

    fn put_host(&self, host: &Host) -> MetaStoreResult<()> {
        self.0.put_host(host)
    }

    fn list_hosts(&self) -> MetaStoreResult<Vec<Host>> {
        self.0.list_hosts()
    }

    fn set_host_status(&self, host_id: &HostId, status: HostStatus) -> MetaStoreResult<Host> {
        self.0.set_host_status(host_id, status)
    }

    fn insert_replica(&self, _replica: &NewReplica) -> MetaStoreResult<Replica> {
        Err(MetaStoreError::Io(std::io::Error::other("disk full")))
    }

    fn mark_replicas_deleted(&self, file_id: &FileId, deleted_at: u64) -> MetaStoreResult<usize> {
        self.0.mark_replicas_deleted(file_id, deleted_at)
    }

    fn list_under_replicated(&self, threshold: usize) -> MetaStoreResult<Vec<FileId>> {
        self.0.list_under_replicated(threshold)
    }

    fn list_replicas_for_file(
        &self,
        file_id: &FileId,
        include_deleted: bool,
    ) -> MetaStoreResult<Vec<Replica>> {
        self.0.list_replicas_for_file(file_id, include_deleted)
    }

    fn list_soft_deleted_replicas(&self) -> MetaStoreResult<Vec<Replica>> {
        self.0.list_soft_deleted_replicas()
    }

    fn delete_replica_row(&self, id: &ReplicaId) -> MetaStoreResult<Replica> {
        self.0.delete_replica_row(id)
    }
}

/// A store whose replica row deletions always fail
pub struct FailingDeletes(pub Arc<MetaStore>);

impl MetadataStore for FailingDeletes {
    fn list_active_hosts(&self, exclude: &HashSet<HostId>) -> MetaStoreResult<Vec<Host>> {
        self.0.list_active_hosts(exclude)
    }

    fn get_host(&self, host_id: &HostId) -> MetaStoreResult<Option<Host>> {
        self.0.get_host(host_id)
    }

    fn put_host(&self, host: &Host) -> MetaStoreResult<()> {
        self.0.put_host(host)
    }

    fn list_hosts(&self) -> MetaStoreResult<Vec<Host>> {
        self.0.list_hosts()
    }

    fn set_host_status(&self, host_id: &HostId, status: HostStatus) -> MetaStoreResult<Host> {
        self.0.set_host_status(host_id, status)
    }

    fn insert_replica(&self, replica: &NewReplica) -> MetaStoreResult<Replica> {
        self.0.insert_replica(replica)
    }

    fn mark_replicas_deleted(&self, file_id: &FileId, deleted_at: u64) -> MetaStoreResult<usize> {
        self.0.mark_replicas_deleted(file_id, deleted_at)
    }

    fn list_under_replicated(&self, threshold: usize) -> MetaStoreResult<Vec<FileId>> {
        self.0.list_under_replicated(threshold)
    }

    fn list_replicas_for_file(
        &self,
        file_id: &FileId,
        include_deleted: bool,
    ) -> MetaStoreResult<Vec<Replica>> {
        self.0.list_replicas_for_file(file_id, include_deleted)
    }

    fn list_soft_deleted_replicas(&self) -> MetaStoreResult<Vec<Replica>> {
        self.0.list_soft_deleted_replicas()
    }

    fn delete_replica_row(&self, _id: &ReplicaId) -> MetaStoreResult<Replica> {
        Err(MetaStoreError::Io(std::io::Error::other("read-only index")))
    }
}
