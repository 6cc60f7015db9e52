//! src/services/blob_service.rs
//!
//! BlobService — the coordinator between pathname sanitization, the metadata
//! repository and the content store.
//!
//! Write ordering is chosen so that a crash between the two stores leaves at
//! worst an orphaned content file, never metadata pointing at nothing:
//! - upload writes content first, then metadata
//! - delete removes metadata first, then content
//!
//! Reads trust the metadata store only. No lock or transaction spans both
//! stores, so concurrent writers to one pathname race and the last writer
//! wins independently in each store.

use crate::{
    models::blob::BlobMetadata,
    repository::{MetadataRepository, RepositoryError},
    services::{
        content_store::{ContentStore, ContentStoreError},
        path_sanitizer::{self, PathPolicy, PathRejection, SanitizedPath},
    },
};
use bytes::Bytes;
use futures::Stream;
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use tokio::fs::File;
use tracing::{debug, info, warn};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid pathname: {0}")]
    InvalidPath(#[from] PathRejection),
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error("upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },
    #[error("metadata store failure: {0}")]
    Repository(#[from] RepositoryError),
    #[error("content store failure: {0}")]
    Content(#[source] io::Error),
}

impl From<ContentStoreError> for BlobError {
    fn from(err: ContentStoreError) -> Self {
        match err {
            ContentStoreError::TooLarge { limit } => BlobError::PayloadTooLarge { limit },
            ContentStoreError::Io(err) => BlobError::Content(err),
            ContentStoreError::NoParent(path) => BlobError::Content(io::Error::new(
                ErrorKind::InvalidInput,
                format!("content path {} has no parent directory", path.display()),
            )),
        }
    }
}

pub type BlobResult<T> = Result<T, BlobError>;

/// What a delete actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Metadata and content were both removed.
    Deleted,
    /// No metadata record existed.
    NotFound,
    /// The metadata record was removed but its content file was already gone.
    ContentMissing,
}

/// A blob opened for reading.
#[derive(Debug)]
pub struct BlobReader {
    pub metadata: BlobMetadata,
    pub file: File,
}

#[derive(Clone)]
pub struct BlobService {
    repository: Arc<dyn MetadataRepository>,
    content: ContentStore,
    policy: PathPolicy,
    max_upload_size: u64,
}

impl BlobService {
    /// `base_path` should already be absolute; it is used as given for
    /// sanitization so the result never depends on the working directory.
    pub fn new(
        repository: Arc<dyn MetadataRepository>,
        base_path: impl Into<PathBuf>,
        policy: PathPolicy,
        max_upload_size: u64,
    ) -> Self {
        Self {
            repository,
            content: ContentStore::new(base_path),
            policy,
            max_upload_size,
        }
    }

    pub fn content_store(&self) -> &ContentStore {
        &self.content
    }

    pub fn repository(&self) -> &Arc<dyn MetadataRepository> {
        &self.repository
    }

    fn sanitize(&self, pathname: &str) -> BlobResult<SanitizedPath> {
        Ok(path_sanitizer::sanitize(
            pathname,
            self.content.base_path(),
            &self.policy,
        )?)
    }

    /// All metadata records, unordered.
    pub async fn list(&self) -> BlobResult<Vec<BlobMetadata>> {
        Ok(self.repository.list().await?)
    }

    /// Store `stream` at `pathname`, fully replacing any previous blob.
    ///
    /// The recorded size is the number of bytes actually written. If the
    /// metadata write fails after the content landed, the content file is
    /// left in place as an orphan and the error is returned.
    pub async fn upload<S, E>(
        &self,
        pathname: &str,
        stream: S,
        content_type: Option<&str>,
    ) -> BlobResult<BlobMetadata>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<io::Error>,
    {
        let path = self.sanitize(pathname)?;
        let size = self
            .content
            .write(path.absolute(), stream, self.max_upload_size)
            .await?;

        let content_type = content_type
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        let record = BlobMetadata::new(path.pathname(), content_type, size);

        match self.repository.save(&record).await {
            Ok(stored) => {
                info!("stored blob {} ({} bytes)", stored.pathname, stored.size);
                Ok(stored)
            }
            Err(err) => {
                warn!(
                    "content for {} written but metadata save failed; file left orphaned",
                    path.pathname()
                );
                Err(err.into())
            }
        }
    }

    /// Look up and open the blob at `pathname`.
    ///
    /// `Ok(None)` when there is no metadata, or when metadata exists but the
    /// content file is gone.
    pub async fn get(&self, pathname: &str) -> BlobResult<Option<BlobReader>> {
        let path = self.sanitize(pathname)?;
        let Some(metadata) = self.repository.get_by_pathname(path.pathname()).await? else {
            return Ok(None);
        };

        match self.content.read(path.absolute()).await {
            Ok(file) => Ok(Some(BlobReader { metadata, file })),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(
                    "metadata for {} exists but content is missing",
                    path.pathname()
                );
                Ok(None)
            }
            Err(err) => Err(BlobError::Content(err)),
        }
    }

    /// Metadata only, for HEAD requests. Applies the same orphan check as
    /// [`BlobService::get`].
    pub async fn metadata(&self, pathname: &str) -> BlobResult<Option<BlobMetadata>> {
        let path = self.sanitize(pathname)?;
        let Some(metadata) = self.repository.get_by_pathname(path.pathname()).await? else {
            return Ok(None);
        };

        if self
            .content
            .exists(path.absolute())
            .await
            .map_err(BlobError::Content)?
        {
            Ok(Some(metadata))
        } else {
            warn!(
                "metadata for {} exists but content is missing",
                path.pathname()
            );
            Ok(None)
        }
    }

    /// Remove the blob at `pathname`, metadata first.
    pub async fn delete(&self, pathname: &str) -> BlobResult<DeleteOutcome> {
        let path = self.sanitize(pathname)?;
        if self
            .repository
            .get_by_pathname(path.pathname())
            .await?
            .is_none()
        {
            return Ok(DeleteOutcome::NotFound);
        }

        if !self.repository.delete_by_pathname(path.pathname()).await? {
            // Lost a race with another delete.
            debug!("metadata for {} vanished before delete", path.pathname());
            return Ok(DeleteOutcome::NotFound);
        }

        let removed = self
            .content
            .delete(path.absolute())
            .await
            .map_err(BlobError::Content)?;

        if removed {
            info!("deleted blob {}", path.pathname());
            Ok(DeleteOutcome::Deleted)
        } else {
            warn!(
                "deleted metadata for {} but its content was already missing",
                path.pathname()
            );
            Ok(DeleteOutcome::ContentMissing)
        }
    }
}
