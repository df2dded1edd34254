//! Local filesystem storage backend
//!
//! The reference backend: `store` copies the cached file to
//! `{root}/{store_path}` and `retrieve` points back at
//! `{root}/{store_path(identifier)}`. It reports no URL of its own, so the
//! uploader falls back to the path-relative URL.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;

use portage_core::{SanitizedFile, StorageKind, StoredFile};

use crate::traits::{Storage, StorageError, StorageResult, UploadPaths};

/// Local filesystem storage implementation
#[derive(Clone, Copy, Debug, Default)]
pub struct FileStorage;

impl FileStorage {
    pub fn new() -> Self {
        FileStorage
    }

    /// Convert a store key to a filesystem path under the uploader's root,
    /// rejecting traversal sequences that could escape it.
    fn key_to_path(uploader: &dyn UploadPaths, key: &str) -> StorageResult<PathBuf> {
        if key.contains("..") || key.starts_with('/') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(uploader.root().join(key))
    }
}

#[async_trait]
impl Storage for FileStorage {
    fn setup(&self) -> StorageResult<()> {
        // Directories are created per store; nothing to prepare up front.
        Ok(())
    }

    async fn store(
        &self,
        uploader: &dyn UploadPaths,
        file: &SanitizedFile,
    ) -> StorageResult<StoredFile> {
        let key = uploader
            .store_path()
            .ok_or_else(|| StorageError::StoreFailed("uploader has no filename".to_string()))?;
        let dest = Self::key_to_path(uploader, &key)?;
        let start = Instant::now();

        file.copy_to(&dest, None)
            .await
            .map_err(|e| StorageError::StoreFailed(e.to_string()))?;

        tracing::info!(
            path = %dest.display(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "local storage store successful"
        );

        Ok(StoredFile {
            path: Some(dest),
            url: None,
            identifier: uploader.filename(),
        })
    }

    async fn retrieve(
        &self,
        uploader: &dyn UploadPaths,
        identifier: &str,
    ) -> StorageResult<StoredFile> {
        let key = uploader.store_path_for(identifier);
        let path = Self::key_to_path(uploader, &key)?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            "local storage retrieve"
        );

        Ok(StoredFile {
            path: Some(path),
            url: None,
            identifier: Some(identifier.to_string()),
        })
    }

    fn kind(&self) -> StorageKind {
        StorageKind::File
    }
}
