//! WebDAV implementation of the object transport

use crate::transport::{ObjectSource, ObjectTransport, TransportError, TransportResult};
use async_trait::async_trait;
use replicafs_common::config::TransportConfig;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Method};
use std::time::Duration;
use tracing::{debug, warn};

/// MKCOL: created, or already present (301 redirect / 405 not allowed)
const MKCOL_OK: &[u16] = &[200, 201, 301, 405];
/// PUT: created, or an existing resource replaced
const PUT_OK: &[u16] = &[200, 201, 204];
/// DELETE: removed, or already absent
const DELETE_OK: &[u16] = &[200, 204, 404];

/// WebDAV client for storage hosts
pub struct WebDavClient {
    http: reqwest::Client,
    mkcol: Method,
    collection_pause: Duration,
}

impl WebDavClient {
    /// Create a new client applying the configured timeouts
    pub fn new(config: &TransportConfig) -> TransportResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| TransportError::Configuration(e.to_string()))?;
        let mkcol = Method::from_bytes(b"MKCOL")
            .map_err(|e| TransportError::Configuration(e.to_string()))?;

        Ok(Self {
            http,
            mkcol,
            collection_pause: config.collection_pause(),
        })
    }

    /// Open the body of a write, with its length when known up front
    async fn open_source(&self, source: &ObjectSource) -> TransportResult<(Body, Option<u64>)> {
        match source {
            ObjectSource::File(path) => {
                let source_err = |e| TransportError::Source {
                    path: path.display().to_string(),
                    source: e,
                };
                let file = tokio::fs::File::open(path).await.map_err(source_err)?;
                let len = file.metadata().await.map_err(source_err)?.len();
                Ok((Body::from(file), Some(len)))
            }
            ObjectSource::Url(src) => {
                let response = self
                    .http
                    .get(src)
                    .send()
                    .await
                    .map_err(|e| request_error("GET", src, e))?;
                let status = response.status().as_u16();
                if !response.status().is_success() {
                    warn!("GET {} {} NG", src, status);
                    return Err(TransportError::Status {
                        method: "GET",
                        url: src.clone(),
                        status,
                    });
                }
                let len = response.content_length();
                Ok((Body::wrap_stream(response.bytes_stream()), len))
            }
        }
    }
}

#[async_trait]
impl ObjectTransport for WebDavClient {
    async fn create_collection(&self, url: &str) -> TransportResult<()> {
        let response = self
            .http
            .request(self.mkcol.clone(), url)
            .send()
            .await
            .map_err(|e| request_error("MKCOL", url, e))?;
        check_status("MKCOL", url, response.status().as_u16(), MKCOL_OK)
    }

    async fn write(&self, url: &str, source: &ObjectSource) -> TransportResult<()> {
        let (body, len) = self.open_source(source).await?;
        let mut request = self.http.put(url).body(body);
        if let Some(len) = len {
            request = request.header(CONTENT_LENGTH, len);
        }
        let response = request
            .send()
            .await
            .map_err(|e| request_error("PUT", url, e))?;
        check_status("PUT", url, response.status().as_u16(), PUT_OK)
    }

    async fn delete(&self, url: &str) -> TransportResult<()> {
        let response = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(|e| request_error("DELETE", url, e))?;
        check_status("DELETE", url, response.status().as_u16(), DELETE_OK)
    }

    fn collection_pause(&self) -> Duration {
        self.collection_pause
    }
}

fn check_status(method: &'static str, url: &str, status: u16, ok: &[u16]) -> TransportResult<()> {
    if ok.contains(&status) {
        debug!("{} {} {} OK", method, url, status);
        Ok(())
    } else {
        warn!("{} {} {} NG", method, url, status);
        Err(TransportError::Status {
            method,
            url: url.to_string(),
            status,
        })
    }
}

fn request_error(method: &'static str, url: &str, source: reqwest::Error) -> TransportError {
    warn!("{} {} NG {}", method, url, source);
    TransportError::Request {
        method,
        url: url.to_string(),
        source,
    }
}
