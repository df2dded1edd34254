//! Error types module
//!
//! All lifecycle failures are unified under the `UploadError` enum. The
//! three input-validation kinds (`FormNotMultipart`, `InvalidParameter`,
//! `Integrity`) are fatal to the triggering call and are never retried;
//! processor failures are carried opaquely as `anyhow::Error`.

use std::io;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The input to a cache operation was a raw filesystem path rather than
    /// an open upload stream. Refusing these prevents accidental ingestion
    /// of arbitrary local paths.
    #[error("Form is not multipart: expected an open upload stream, got a raw path")]
    FormNotMultipart,

    /// A cache name or filename failed validation during cache retrieval.
    #[error("Invalid cache parameter: {0}")]
    InvalidParameter(String),

    /// The file extension is not on the configured allow list.
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// A storage backend operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// A processor raised; the original error is preserved as the source.
    #[error("Processor '{name}' failed")]
    Processing {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The pipeline names a processor that was never registered.
    #[error("Unknown processor: {0}")]
    UnknownProcessor(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for lifecycle operations
pub type UploadResult<T> = Result<T, UploadError>;

impl UploadError {
    /// Create an `Io` error tagged with the path it occurred at.
    pub fn from_io(path: impl AsRef<Path>, source: io::Error) -> Self {
        UploadError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_carries_path() {
        let err = UploadError::from_io(
            "/tmp/portage/missing",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/portage/missing"));
    }

    #[test]
    fn test_processing_error_preserves_source() {
        use std::error::Error;

        let err = UploadError::Processing {
            name: "resize".to_string(),
            source: anyhow::anyhow!("bad geometry"),
        };
        assert!(err.to_string().contains("resize"));
        assert!(err.source().is_some());
    }
}
