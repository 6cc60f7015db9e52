pub mod blob_service;
pub mod content_store;
pub mod path_sanitizer;
