//! Core data models for the blob store.
//!
//! Records map to the `blobs` table via `sqlx::FromRow` and serialize as
//! JSON via `serde` for the listing endpoint.

pub mod blob;
