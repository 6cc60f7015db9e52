//! Metadata repository: the persistent record of every blob, keyed by its
//! normalized pathname.
//!
//! The coordinator only talks to the [`MetadataRepository`] trait, so the
//! SQLite adapter can be swapped for the in-memory one in tests.

use crate::models::blob::BlobMetadata;
use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
pub mod memory;
pub mod sqlite;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Every stored record, in no particular order.
    async fn list(&self) -> RepositoryResult<Vec<BlobMetadata>>;

    /// Insert or replace the record for `record.pathname`.
    ///
    /// An existing record keeps its `id`; every other field is overwritten.
    /// Returns the record as stored.
    async fn save(&self, record: &BlobMetadata) -> RepositoryResult<BlobMetadata>;

    async fn get_by_pathname(&self, pathname: &str) -> RepositoryResult<Option<BlobMetadata>>;

    /// Remove the record for `pathname`. Returns `false` if none existed.
    async fn delete_by_pathname(&self, pathname: &str) -> RepositoryResult<bool>;

    /// Cheap round-trip used by the readiness probe.
    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}
