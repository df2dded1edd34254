//! Portage Uploader Library
//!
//! The lifecycle core of the upload engine: an inbound file is staged in a
//! temporary cache area, optionally run through a processing pipeline and
//! mirrored into a tree of named versions, then persisted to a pluggable
//! storage backend that hands back a stable identifier for later retrieval.
//!
//! Definitions are built once at startup with [`UploaderBuilder`]; each
//! logical attachment attempt gets a fresh [`Uploader`] instance from the
//! shared definition.

pub mod definition;
pub mod uploader;

// Re-export commonly used types
pub use definition::{FilenameFn, ProcessorFn, UploaderBuilder, UploaderDefinition};
pub use portage_core::{
    SanitizedFile, StorageKind, StoredFile, UploadError, UploadInput, UploadResult, UploaderConfig,
};
pub use portage_storage::{Storage, StorageError, StorageResult, UploadPaths};
pub use uploader::Uploader;
