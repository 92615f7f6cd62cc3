//! Store and resolve workflows

use crate::engine::{Engine, meta_error};
use replicafs_client::ObjectSource;
use replicafs_common::{Error, FileId, NewReplica, Result};
use replicafs_placement::storage_path;
use std::collections::HashSet;
use std::path::Path;
use tracing::{error, info, warn};

/// Attempts at drawing an identifier that is not yet indexed
const FILE_ID_ATTEMPTS: usize = 3;

impl Engine {
    /// Store a local file on the host with the most free capacity.
    ///
    /// `display_name` is only consulted for an extension when `source` has
    /// none. Nothing is indexed unless the transfer succeeded. If indexing
    /// fails after the transfer, [`Error::IndexWriteFailed`] is returned and
    /// the written object is left in place.
    pub async fn store(&self, source: &Path, display_name: Option<&str>) -> Result<FileId> {
        let metadata = tokio::fs::metadata(source).await.map_err(|e| {
            Error::invalid_argument(format!("cannot read {}: {e}", source.display()))
        })?;
        if !metadata.is_file() {
            return Err(Error::invalid_argument(format!(
                "{} is not a regular file",
                source.display()
            )));
        }
        let filesize = metadata.len();

        let Some(host) = self.hosts(&HashSet::new())?.into_iter().next() else {
            error!("There is no available host for {}", source.display());
            return Err(Error::NoHostAvailable);
        };

        let file_id = self.new_file_id()?;
        let path = storage_path(&file_id, &host.root_path, source, display_name);
        let url = host.object_url(&path);

        info!("Store {} > {}", source.display(), url);
        if let Err(e) = self
            .transport
            .upload(&url, &ObjectSource::File(source.to_path_buf()))
            .await
        {
            error!("Can not transfer. {}, {}", url, e);
            return Err(Error::TransferFailed {
                url,
                detail: e.to_string(),
            });
        }

        let replica = NewReplica {
            file_id: file_id.clone(),
            host_id: host.host_id.clone(),
            path,
            filesize,
        };
        if let Err(e) = self.meta.insert_replica(&replica) {
            error!("Can not add {} to the index, {} is orphaned: {}", file_id, url, e);
            return Err(Error::IndexWriteFailed {
                file_id: file_id.to_string(),
                detail: e.to_string(),
            });
        }

        Ok(file_id)
    }

    /// URL of one live replica of `file_id`.
    ///
    /// Fails with [`Error::NotFound`] for an empty or unknown identifier and
    /// for files whose replicas are all marked deleted.
    pub fn resolve(&self, file_id: &str) -> Result<String> {
        let Ok(file_id) = FileId::new(file_id) else {
            return Err(Error::not_found(file_id));
        };
        let (replica, host) = self.locate(&file_id)?;
        let url = host.object_url(&replica.path);
        info!("Get {}", url);
        Ok(url)
    }

    /// A random identifier with no index rows, live or deleted
    fn new_file_id(&self) -> Result<FileId> {
        for _ in 0..FILE_ID_ATTEMPTS {
            let file_id = FileId::generate();
            let taken = !self
                .meta
                .list_replicas_for_file(&file_id, true)
                .map_err(meta_error)?
                .is_empty();
            if !taken {
                return Ok(file_id);
            }
            warn!("Generated file id {} is already indexed, drawing again", file_id);
        }
        Err(Error::metadata("could not allocate an unused file identifier"))
    }
}
