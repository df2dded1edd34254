//! Portage Core Library
//!
//! This crate provides the shared types of the portage upload-lifecycle
//! engine: configuration, error types, the sanitized file handle that every
//! lifecycle operation works against, and the storage backend kind enum.

pub mod config;
pub mod error;
pub mod sanitized_file;
pub mod storage_types;

// Re-export commonly used types
pub use config::UploaderConfig;
pub use error::{UploadError, UploadResult};
pub use sanitized_file::{SanitizedFile, UploadInput};
pub use storage_types::{StorageKind, StoredFile};
