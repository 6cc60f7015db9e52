//! In-memory metadata repository used by coordinator tests.

use super::{MetadataRepository, RepositoryResult};
use crate::models::blob::BlobMetadata;
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryMetadataRepository {
    records: RwLock<HashMap<String, BlobMetadata>>,
    fail_saves: AtomicBool,
    fail_deletes: AtomicBool,
    fail_pings: AtomicBool,
}

impl InMemoryMetadataRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Make every subsequent `save` fail.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `delete_by_pathname` fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `ping` fail.
    pub fn fail_pings(&self, fail: bool) {
        self.fail_pings.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> RepositoryResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(sqlx::Error::PoolClosed.into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MetadataRepository for InMemoryMetadataRepository {
    async fn list(&self) -> RepositoryResult<Vec<BlobMetadata>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn save(&self, record: &BlobMetadata) -> RepositoryResult<BlobMetadata> {
        Self::check(&self.fail_saves)?;
        let mut records = self.records.write().await;
        let mut stored = record.clone();
        if let Some(existing) = records.get(&record.pathname) {
            stored.id = existing.id;
        }
        records.insert(stored.pathname.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_by_pathname(&self, pathname: &str) -> RepositoryResult<Option<BlobMetadata>> {
        Ok(self.records.read().await.get(pathname).cloned())
    }

    async fn delete_by_pathname(&self, pathname: &str) -> RepositoryResult<bool> {
        Self::check(&self.fail_deletes)?;
        Ok(self.records.write().await.remove(pathname).is_some())
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Self::check(&self.fail_pings)
    }
}
