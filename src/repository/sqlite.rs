//! SQLite-backed metadata repository.

use super::{MetadataRepository, RepositoryError, RepositoryResult};
use crate::models::blob::BlobMetadata;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

const INIT_MIGRATION: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct SqliteMetadataRepository {
    /// Shared pool; sqlx handles concurrent access.
    db: Arc<SqlitePool>,
}

impl SqliteMetadataRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema. Every statement is idempotent, so this is
    /// safe to run on each startup.
    pub async fn migrate(&self) -> RepositoryResult<usize> {
        let statements = INIT_MIGRATION
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt)
                .execute(&*self.db)
                .await
                .map_err(|err| RepositoryError::Migration(err.to_string()))?;
        }

        Ok(statements.len())
    }
}

#[async_trait]
impl MetadataRepository for SqliteMetadataRepository {
    async fn list(&self) -> RepositoryResult<Vec<BlobMetadata>> {
        let rows = sqlx::query_as::<_, BlobMetadata>(
            "SELECT id, pathname, content_type, size, uploaded_at FROM blobs",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    async fn save(&self, record: &BlobMetadata) -> RepositoryResult<BlobMetadata> {
        let stored = sqlx::query_as::<_, BlobMetadata>(
            r#"
            INSERT INTO blobs (id, pathname, content_type, size, uploaded_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(pathname) DO UPDATE SET
                content_type = excluded.content_type,
                size = excluded.size,
                uploaded_at = excluded.uploaded_at
            RETURNING id, pathname, content_type, size, uploaded_at
            "#,
        )
        .bind(record.id)
        .bind(&record.pathname)
        .bind(&record.content_type)
        .bind(record.size)
        .bind(record.uploaded_at)
        .fetch_one(&*self.db)
        .await?;
        Ok(stored)
    }

    async fn get_by_pathname(&self, pathname: &str) -> RepositoryResult<Option<BlobMetadata>> {
        let row = sqlx::query_as::<_, BlobMetadata>(
            "SELECT id, pathname, content_type, size, uploaded_at
             FROM blobs WHERE pathname = ?",
        )
        .bind(pathname)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    async fn delete_by_pathname(&self, pathname: &str) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM blobs WHERE pathname = ?")
            .bind(pathname)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> RepositoryResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        debug!("sqlite ping returned {}", one);
        Ok(())
    }
}
