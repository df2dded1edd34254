//! Configuration module
//!
//! Process-wide settings for the upload lifecycle: where cached and stored
//! files live, optional permission bits applied after caching, and whether
//! `store` routes through the cache first.

use std::env;
use std::path::PathBuf;

const DEFAULT_ROOT: &str = "public";
const DEFAULT_STORE_DIR: &str = "uploads";
const DEFAULT_CACHE_SUBDIR: &str = "tmp";

/// Uploader configuration.
///
/// `root` is the public root: cache and store paths are joined onto it on
/// disk, and URLs are those same paths relative to it, prefixed with `/`.
#[derive(Clone, Debug)]
pub struct UploaderConfig {
    pub root: PathBuf,
    pub store_dir: String,
    pub cache_dir: String,
    /// Octal file mode applied after moving a file into the cache.
    pub permissions: Option<u32>,
    /// When false, `store` bypasses the cache directory entirely.
    pub use_cache: bool,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        UploaderConfig {
            root: PathBuf::from(DEFAULT_ROOT),
            store_dir: DEFAULT_STORE_DIR.to_string(),
            cache_dir: format!("{}/{}", DEFAULT_STORE_DIR, DEFAULT_CACHE_SUBDIR),
            permissions: None,
            use_cache: true,
        }
    }
}

impl UploaderConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let store_dir =
            env::var("PORTAGE_STORE_DIR").unwrap_or_else(|_| DEFAULT_STORE_DIR.to_string());
        let cache_dir = env::var("PORTAGE_CACHE_DIR")
            .unwrap_or_else(|_| format!("{}/{}", store_dir, DEFAULT_CACHE_SUBDIR));

        let permissions = match env::var("PORTAGE_PERMISSIONS") {
            Ok(raw) => Some(u32::from_str_radix(&raw, 8).map_err(|e| {
                anyhow::anyhow!("PORTAGE_PERMISSIONS must be an octal mode: {}", e)
            })?),
            Err(_) => None,
        };

        Ok(UploaderConfig {
            root: env::var("PORTAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_ROOT)),
            store_dir,
            cache_dir,
            permissions,
            use_cache: env::var("PORTAGE_USE_CACHE")
                .map(|v| !matches!(v.to_lowercase().as_str(), "false" | "0" | "no"))
                .unwrap_or(true),
        })
    }
}
