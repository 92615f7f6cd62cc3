//! replicafs Common - Shared types and utilities
//!
//! This crate provides the identifiers, records, error definitions and
//! configuration used across all replicafs components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
