//! Storage abstraction trait
//!
//! This module defines the contract every storage backend must implement,
//! and the view of the uploader a backend is allowed to see.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use portage_core::{SanitizedFile, StorageKind, StoredFile, UploadError};

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store failed: {0}")]
    StoreFailed(String),

    #[error("Retrieve failed: {0}")]
    RetrieveFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        UploadError::Storage(err.to_string())
    }
}

/// Path information a backend may ask of the uploader that owns the file.
///
/// This is the whole surface backends see; they never touch the uploader's
/// lifecycle state directly.
pub trait UploadPaths: Send + Sync {
    /// Filesystem root that store and cache paths are relative to.
    fn root(&self) -> &Path;

    /// Store path for the uploader's current file, or `None` when it has no
    /// filename yet.
    fn store_path(&self) -> Option<String>;

    /// Store path for an arbitrary filename (used when retrieving by
    /// identifier).
    fn store_path_for(&self, for_file: &str) -> String;

    /// Sanitized, possibly overridden filename of the current file.
    fn filename(&self) -> Option<String>;
}

/// Storage backend contract
///
/// All backends (local filesystem, object stores) implement this trait so
/// the uploader can persist and re-hydrate files without coupling to any
/// implementation.
#[async_trait]
pub trait Storage: Send + Sync {
    /// One-time backend setup. Must be idempotent; the selector invokes it
    /// once per (definition, backend kind) pair, never on every store.
    fn setup(&self) -> StorageResult<()>;

    /// Persist the uploader's current file, returning the durable handle
    /// that replaces it.
    async fn store(
        &self,
        uploader: &dyn UploadPaths,
        file: &SanitizedFile,
    ) -> StorageResult<StoredFile>;

    /// Re-hydrate a previously stored file by identifier.
    async fn retrieve(
        &self,
        uploader: &dyn UploadPaths,
        identifier: &str,
    ) -> StorageResult<StoredFile>;

    /// The backend kind this implementation answers to.
    fn kind(&self) -> StorageKind;
}
