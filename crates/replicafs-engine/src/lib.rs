//! replicafs Engine - replica placement and maintenance
//!
//! The [`Engine`] stores files on the storage host with the most free
//! capacity, resolves a file identifier to a readable URL, and runs the two
//! batch jobs that keep hosts and index in step:
//!
//! - [`Engine::replicate`] copies under-replicated files onto new hosts
//! - [`Engine::erase`] removes soft-deleted replicas from their hosts
//!
//! Each batch job holds a marker-file lock from [`lock`] for its whole run.

mod engine;
mod erase;
pub mod lock;
mod replicate;
mod store;

#[cfg(test)]
mod test_support;

pub use engine::Engine;
pub use erase::EraseReport;
pub use lock::{ERASE_LOCK, LockGuard, LockManager, REPLICATION_LOCK};
pub use replicate::ReplicationReport;
