//! Object transport abstraction
//!
//! The placement engine only needs three primitives from a storage host:
//! create a collection, write a resource and delete a resource.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Error type for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{method} {url} failed: {source}")]
    Request {
        method: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[error("{method} {url} returned HTTP {status}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
    },
    #[error("cannot read source {path}: {source}")]
    Source {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("client configuration error: {0}")]
    Configuration(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Where the bytes of a write come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectSource {
    /// A local file
    File(PathBuf),
    /// An object already stored on some host
    Url(String),
}

impl fmt::Display for ObjectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Primitives of the object transport protocol.
#[async_trait]
pub trait ObjectTransport: Send + Sync {
    /// Create a collection; an already existing collection is a success
    async fn create_collection(&self, url: &str) -> TransportResult<()>;

    /// Write `source` to `url`
    async fn write(&self, url: &str, source: &ObjectSource) -> TransportResult<()>;

    /// Delete the resource at `url`; an absent resource is a success
    async fn delete(&self, url: &str) -> TransportResult<()>;

    /// Pause between successive collection creations in [`upload`](Self::upload)
    fn collection_pause(&self) -> Duration {
        Duration::ZERO
    }

    /// Create every intermediate collection of `url`, then write `source`.
    ///
    /// Stops at the first collection that cannot be created.
    async fn upload(&self, url: &str, source: &ObjectSource) -> TransportResult<()> {
        let pause = self.collection_pause();
        for collection in collection_urls(url)? {
            self.create_collection(&collection).await?;
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
        self.write(url, source).await
    }
}

/// Intermediate collections of a resource URL, outermost first.
///
/// `http://h:81/dav/a/b/x.txt` yields `http://h:81/dav/`,
/// `http://h:81/dav/a/` and `http://h:81/dav/a/b/`.
pub fn collection_urls(url: &str) -> TransportResult<Vec<String>> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| TransportError::InvalidUrl(format!("{url}: no host")))?;
    let mut prefix = match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    };

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    let Some((_, dirs)) = segments.split_last() else {
        return Ok(Vec::new());
    };

    let mut urls = Vec::with_capacity(dirs.len());
    for dir in dirs {
        prefix.push('/');
        prefix.push_str(dir);
        urls.push(format!("{prefix}/"));
    }
    Ok(urls)
}
