//! Persistent metadata store backed by redb.
//!
//! Hosts and replicas are bincode-encoded rows. Every mutation runs in its
//! own write transaction; redb serializes write transactions, so concurrent
//! accounting updates to the same host cannot be lost.

use crate::MetadataStore;
use crate::tables;
use redb::{Database, ReadableMultimapTable, ReadableTable};
use replicafs_common::{
    FileId, Host, HostId, HostStatus, NewReplica, Replica, ReplicaId, current_timestamp,
};
use replicafs_placement::rank_hosts;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, error, warn};

/// Error type for metadata store operations
#[derive(Debug, thiserror::Error)]
pub enum MetaStoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("host not found: {0}")]
    HostNotFound(String),
    #[error("replica not found: {0}")]
    ReplicaNotFound(String),
    #[error("replica {0} is not marked for deletion")]
    NotSoftDeleted(String),
}

impl From<redb::TransactionError> for MetaStoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

pub type MetaStoreResult<T> = Result<T, MetaStoreError>;

/// Persistent metadata store backed by redb.
pub struct MetaStore {
    db: Database,
}

impl MetaStore {
    /// Open (or create) the redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> MetaStoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::HOSTS)?;
            let _t = write_txn.open_table(tables::REPLICAS)?;
            let _t = write_txn.open_multimap_table(tables::FILE_REPLICAS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    fn load_hosts(&self) -> MetaStoreResult<Vec<Host>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::HOSTS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            match bincode::deserialize::<Host>(entry.1.value()) {
                Ok(host) => result.push(host),
                Err(e) => error!("Failed to decode host '{}': {}", entry.0.value(), e),
            }
        }
        Ok(result)
    }

    /// Scan every replica row, keeping those accepted by `keep`
    fn scan_replicas(&self, keep: impl Fn(&Replica) -> bool) -> MetaStoreResult<Vec<Replica>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::REPLICAS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            match bincode::deserialize::<Replica>(entry.1.value()) {
                Ok(replica) if keep(&replica) => result.push(replica),
                Ok(_) => {}
                Err(e) => error!("Failed to decode replica '{}': {}", entry.0.value(), e),
            }
        }
        Ok(result)
    }
}

impl MetadataStore for MetaStore {
    fn list_active_hosts(&self, exclude: &HashSet<HostId>) -> MetaStoreResult<Vec<Host>> {
        Ok(rank_hosts(self.load_hosts()?, exclude))
    }

    fn get_host(&self, host_id: &HostId) -> MetaStoreResult<Option<Host>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(tables::HOSTS)?;
        match table.get(host_id.as_str())? {
            Some(val) => Ok(Some(bincode::deserialize(val.value())?)),
            None => Ok(None),
        }
    }

    fn put_host(&self, host: &Host) -> MetaStoreResult<()> {
        let bytes = bincode::serialize(host)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(tables::HOSTS)?;
            table.insert(host.host_id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn list_hosts(&self) -> MetaStoreResult<Vec<Host>> {
        // redb iterates in key order, i.e. by host id
        self.load_hosts()
    }

    fn set_host_status(&self, host_id: &HostId, status: HostStatus) -> MetaStoreResult<Host> {
        let write_txn = self.db.begin_write()?;
        let host = {
            let mut table = write_txn.open_table(tables::HOSTS)?;
            let mut host: Host = match table.get(host_id.as_str())? {
                Some(val) => bincode::deserialize(val.value())?,
                None => return Err(MetaStoreError::HostNotFound(host_id.to_string())),
            };
            host.status = status;
            let bytes = bincode::serialize(&host)?;
            table.insert(host_id.as_str(), bytes.as_slice())?;
            host
        };
        write_txn.commit()?;
        Ok(host)
    }

    fn insert_replica(&self, new: &NewReplica) -> MetaStoreResult<Replica> {
        let now = current_timestamp();
        let replica = Replica {
            id: ReplicaId::new(),
            file_id: new.file_id.clone(),
            host_id: new.host_id.clone(),
            path: new.path.clone(),
            filesize: new.filesize,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let row_key = replica.id.to_string();
        let row = bincode::serialize(&replica)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut hosts = write_txn.open_table(tables::HOSTS)?;
            let mut host: Host = match hosts.get(new.host_id.as_str())? {
                Some(val) => bincode::deserialize(val.value())?,
                None => return Err(MetaStoreError::HostNotFound(new.host_id.to_string())),
            };
            host.disk_used = host.disk_used.saturating_add(new.filesize);
            let host_bytes = bincode::serialize(&host)?;
            hosts.insert(host.host_id.as_str(), host_bytes.as_slice())?;

            let mut replicas = write_txn.open_table(tables::REPLICAS)?;
            replicas.insert(row_key.as_str(), row.as_slice())?;

            let mut index = write_txn.open_multimap_table(tables::FILE_REPLICAS)?;
            index.insert(new.file_id.as_str(), row_key.as_str())?;
        }
        write_txn.commit()?;

        debug!(
            "Indexed replica {} of {} on {} (+{} bytes)",
            replica.id, replica.file_id, replica.host_id, replica.filesize
        );
        Ok(replica)
    }

    fn mark_replicas_deleted(&self, file_id: &FileId, deleted_at: u64) -> MetaStoreResult<usize> {
        let write_txn = self.db.begin_write()?;
        let ids: Vec<String> = {
            let index = write_txn.open_multimap_table(tables::FILE_REPLICAS)?;
            let mut ids = Vec::new();
            for id in index.get(file_id.as_str())? {
                ids.push(id?.value().to_string());
            }
            ids
        };

        let mut marked = 0;
        {
            let mut replicas = write_txn.open_table(tables::REPLICAS)?;
            for id in &ids {
                let mut replica: Replica = match replicas.get(id.as_str())? {
                    Some(val) => bincode::deserialize(val.value())?,
                    None => {
                        warn!("Index entry {} of {} has no replica row", id, file_id);
                        continue;
                    }
                };
                if replica.is_deleted() {
                    continue;
                }
                replica.deleted_at = Some(deleted_at);
                replica.updated_at = deleted_at;
                let bytes = bincode::serialize(&replica)?;
                replicas.insert(id.as_str(), bytes.as_slice())?;
                marked += 1;
            }
        }
        write_txn.commit()?;
        Ok(marked)
    }

    fn list_under_replicated(&self, threshold: usize) -> MetaStoreResult<Vec<FileId>> {
        // a file counts each holding host once
        let mut holders: BTreeMap<FileId, HashSet<HostId>> = BTreeMap::new();
        for replica in self.scan_replicas(|r| !r.is_deleted())? {
            holders
                .entry(replica.file_id)
                .or_default()
                .insert(replica.host_id);
        }
        Ok(holders
            .into_iter()
            .filter(|(_, hosts)| hosts.len() < threshold)
            .map(|(file_id, _)| file_id)
            .collect())
    }

    fn list_replicas_for_file(
        &self,
        file_id: &FileId,
        include_deleted: bool,
    ) -> MetaStoreResult<Vec<Replica>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_multimap_table(tables::FILE_REPLICAS)?;
        let replicas = read_txn.open_table(tables::REPLICAS)?;

        let mut result = Vec::new();
        for id in index.get(file_id.as_str())? {
            let id = id?;
            let Some(val) = replicas.get(id.value())? else {
                warn!("Index entry {} of {} has no replica row", id.value(), file_id);
                continue;
            };
            let replica: Replica = bincode::deserialize(val.value())?;
            if include_deleted || !replica.is_deleted() {
                result.push(replica);
            }
        }
        result.sort_by_key(|r| (r.created_at, r.id.as_uuid()));
        Ok(result)
    }

    fn list_soft_deleted_replicas(&self) -> MetaStoreResult<Vec<Replica>> {
        let mut result = self.scan_replicas(Replica::is_deleted)?;
        result.sort_by(|a, b| {
            a.file_id
                .cmp(&b.file_id)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(result)
    }

    fn delete_replica_row(&self, id: &ReplicaId) -> MetaStoreResult<Replica> {
        let row_key = id.to_string();
        let write_txn = self.db.begin_write()?;
        let replica = {
            let mut replicas = write_txn.open_table(tables::REPLICAS)?;
            let replica: Replica = match replicas.get(row_key.as_str())? {
                Some(val) => bincode::deserialize(val.value())?,
                None => return Err(MetaStoreError::ReplicaNotFound(row_key)),
            };
            if !replica.is_deleted() {
                return Err(MetaStoreError::NotSoftDeleted(row_key));
            }
            replicas.remove(row_key.as_str())?;

            let mut index = write_txn.open_multimap_table(tables::FILE_REPLICAS)?;
            index.remove(replica.file_id.as_str(), row_key.as_str())?;

            let mut hosts = write_txn.open_table(tables::HOSTS)?;
            let host: Option<Host> = match hosts.get(replica.host_id.as_str())? {
                Some(val) => Some(bincode::deserialize(val.value())?),
                None => None,
            };
            match host {
                Some(mut host) => {
                    host.disk_used = host.disk_used.saturating_sub(replica.filesize);
                    let bytes = bincode::serialize(&host)?;
                    hosts.insert(host.host_id.as_str(), bytes.as_slice())?;
                }
                None => warn!(
                    "Host {} of replica {} is not registered; no accounting change",
                    replica.host_id, row_key
                ),
            }
            replica
        };
        write_txn.commit()?;

        debug!(
            "Erased replica {} of {} from index (-{} bytes on {})",
            replica.id, replica.file_id, replica.filesize, replica.host_id
        );
        Ok(replica)
    }
}
