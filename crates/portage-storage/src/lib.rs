//! Portage Storage Library
//!
//! This crate provides the storage backend abstraction of the upload
//! lifecycle engine. The uploader core only consumes the narrow contract
//! defined here: `setup` once per selection, `store` a cached file, and
//! `retrieve` a previously stored one by identifier.
//!
//! # Store key format
//!
//! Backends derive their keys from the uploader's store path:
//! `{store_dir}/{version_prefix}{filename}`. Keys must not contain `..` or a
//! leading `/`.

pub mod factory;
pub mod local;
pub mod traits;

// Re-export commonly used types
pub use factory::resolve;
pub use local::FileStorage;
pub use portage_core::StorageKind;
pub use traits::{Storage, StorageError, StorageResult, UploadPaths};
