//! Backend selection
//!
//! Resolves the shortcut backend names (`file`, `s3`) to implementations.

use std::sync::Arc;

use portage_core::{StorageKind, UploaderConfig};

use crate::local::FileStorage;
use crate::traits::{Storage, StorageError, StorageResult};

/// Resolve a backend shortcut to an implementation.
///
/// Resolution does not run `setup`; the selector that assigns the backend
/// is responsible for running it once per selection.
pub fn resolve(kind: StorageKind, _config: &UploaderConfig) -> StorageResult<Arc<dyn Storage>> {
    match kind {
        StorageKind::File => Ok(Arc::new(FileStorage::new())),

        StorageKind::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available in this build".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_file_backend() {
        let storage = resolve(StorageKind::File, &UploaderConfig::default()).unwrap();
        assert_eq!(storage.kind(), StorageKind::File);
    }

    #[test]
    fn test_unavailable_backend_errors() {
        let result = resolve(StorageKind::S3, &UploaderConfig::default());
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }
}
