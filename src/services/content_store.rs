//! src/services/content_store.rs
//!
//! Filesystem-backed byte storage. Paths handed to this store have already
//! been sanitized and resolved beneath `base_path`; the store itself does not
//! know about pathnames or metadata.

use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ContentStoreError {
    #[error("content exceeds the {limit} byte upload limit")]
    TooLarge { limit: u64 },
    #[error("content path {0} has no parent directory")]
    NoParent(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ContentResult<T> = Result<T, ContentStoreError>;

#[derive(Clone, Debug)]
pub struct ContentStore {
    /// Root directory all content lives under.
    base_path: PathBuf,
}

impl ContentStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Stream `stream` into `path`, replacing whatever was there.
    ///
    /// Bytes land in a temp file beside the target and are renamed into place
    /// after an fsync, so readers never observe a half-written blob. Returns
    /// the number of bytes written.
    pub async fn write<S, E>(&self, path: &Path, stream: S, limit: u64) -> ContentResult<u64>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<io::Error>,
    {
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ContentStoreError::NoParent(path.to_path_buf()))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        match copy_limited(&mut file, stream, limit).await {
            Ok(written) => {
                drop(file);
                if let Err(err) = fs::rename(&tmp_path, path).await {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(err.into());
                }
                debug!("wrote {} bytes to {}", written, path.display());
                Ok(written)
            }
            Err(err) => {
                drop(file);
                let _ = fs::remove_file(&tmp_path).await;
                Err(err)
            }
        }
    }

    /// Open `path` for streaming out.
    pub async fn read(&self, path: &Path) -> io::Result<File> {
        File::open(path).await
    }

    pub async fn exists(&self, path: &Path) -> io::Result<bool> {
        fs::try_exists(path).await
    }

    /// Remove `path`. Returns `false` when there was nothing to remove.
    ///
    /// Parent directories are left alone, even when empty, so a concurrent
    /// write into the same directory never loses its parent.
    pub async fn delete(&self, path: &Path) -> io::Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!("removed content file {}", path.display());
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("content file {} already missing", path.display());
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}

async fn copy_limited<S, E>(file: &mut File, stream: S, limit: u64) -> ContentResult<u64>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<io::Error>,
{
    let mut written: u64 = 0;
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Into::into)?;
        written += chunk.len() as u64;
        if written > limit {
            return Err(ContentStoreError::TooLarge { limit });
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}
