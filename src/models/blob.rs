//! Represents the metadata record kept for every stored blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata for a single blob.
///
/// The blob's bytes live in the content store at the location derived from
/// `pathname`; this struct only describes them.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    /// Assigned when the pathname is first written, kept across overwrites.
    pub id: Uuid,

    /// Normalized slash-rooted pathname (e.g. `/photos/cat.png`). Unique.
    pub pathname: String,

    /// MIME type declared by the uploader. Not validated.
    pub content_type: String,

    /// Number of bytes actually written to the content store.
    pub size: i64,

    /// Time of the last successful write.
    pub uploaded_at: DateTime<Utc>,
}

impl BlobMetadata {
    /// Build a fresh record for a write that just completed.
    pub fn new(pathname: impl Into<String>, content_type: impl Into<String>, size: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            pathname: pathname.into(),
            content_type: content_type.into(),
            size: i64::try_from(size).unwrap_or(i64::MAX),
            uploaded_at: Utc::now(),
        }
    }

    /// Strong validator for conditional GETs, derived from size and upload time.
    pub fn etag(&self) -> String {
        format!(
            "\"{:x}-{:x}\"",
            self.size,
            self.uploaded_at.timestamp_millis()
        )
    }
}
