//! Core type definitions for replicafs
//!
//! This module defines the identifiers and records shared by the placement
//! engine, the metadata store and the transport client.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque identifier shared by every replica of one stored file.
///
/// Identifiers are random tokens, never derived from file content.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct FileId(String);

impl FileId {
    /// Generate a new random file identifier (32 lowercase hex characters)
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Create from a caller-supplied token
    pub fn new(id: impl Into<String>) -> Result<Self, FileIdError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), FileIdError> {
        if id.is_empty() {
            return Err(FileIdError::Empty);
        }
        if let Some(c) = id.chars().find(|c| *c == '/' || c.is_whitespace() || c.is_control()) {
            return Err(FileIdError::InvalidChar(c));
        }
        Ok(())
    }
}

impl FromStr for FileId {
    type Err = FileIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({:?})", self.0)
    }
}

/// Errors that can occur when parsing a file identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileIdError {
    #[error("file identifier is empty")]
    Empty,
    #[error("file identifier contains invalid character: {0:?}")]
    InvalidChar(char),
}

/// Identifier of a registered storage host
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct HostId(String);

impl HostId {
    /// Create a host identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Debug for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostId({:?})", self.0)
    }
}

/// Synthetic row identifier of a replica record
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct ReplicaId(Uuid);

impl ReplicaId {
    /// Generate a new random row ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ReplicaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReplicaId({})", self.0)
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostStatus {
    /// Host accepts new replicas
    #[default]
    Active,
    /// Host is registered but never selected for placement
    Inactive,
}

impl HostStatus {
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Inactive => f.write_str("inactive"),
        }
    }
}

impl FromStr for HostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" | "1" => Ok(Self::Active),
            "inactive" | "0" => Ok(Self::Inactive),
            other => Err(format!("unknown host status: {other}")),
        }
    }
}

/// A storage backend registration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub host_id: HostId,
    pub hostname: String,
    pub port: Option<u16>,
    /// Collection under which this host stores objects (e.g. "/dav")
    pub root_path: String,
    pub status: HostStatus,
    /// Capacity in bytes
    pub disk_total: u64,
    /// Bytes accounted to stored replicas; adjusted only on confirmed
    /// store and erase
    pub disk_used: u64,
}

impl Host {
    /// Bytes still available for placement
    #[must_use]
    pub fn free_capacity(&self) -> u64 {
        self.disk_total.saturating_sub(self.disk_used)
    }

    /// `http://hostname[:port]`
    #[must_use]
    pub fn base_url(&self) -> String {
        match self.port {
            Some(port) => format!("http://{}:{port}", self.hostname),
            None => format!("http://{}", self.hostname),
        }
    }

    /// URL of an object stored at `path` on this host
    #[must_use]
    pub fn object_url(&self, path: &str) -> String {
        if path.is_empty() || path.starts_with('/') {
            format!("{}{path}", self.base_url())
        } else {
            format!("{}/{path}", self.base_url())
        }
    }
}

/// One physical copy of a file, as recorded in the metadata store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub id: ReplicaId,
    pub file_id: FileId,
    pub host_id: HostId,
    /// Host-relative storage path
    pub path: String,
    pub filesize: u64,
    pub created_at: u64,
    pub updated_at: u64,
    /// Set when the file has been marked for deletion
    pub deleted_at: Option<u64>,
}

impl Replica {
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Fields supplied by the caller when recording a new replica
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewReplica {
    pub file_id: FileId,
    pub host_id: HostId,
    pub path: String,
    pub filesize: u64,
}

/// Seconds since the Unix epoch
#[must_use]
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
