//! Redb table definitions for persistent metadata storage.

use redb::{MultimapTableDefinition, TableDefinition};

// Key: host_id, Value: bincode-encoded Host
pub const HOSTS: TableDefinition<&str, &[u8]> = TableDefinition::new("hosts");
// Key: replica row id, Value: bincode-encoded Replica
pub const REPLICAS: TableDefinition<&str, &[u8]> = TableDefinition::new("replicas");
// Key: file_id, Values: replica row ids (live and soft-deleted)
pub const FILE_REPLICAS: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("file_replicas");
