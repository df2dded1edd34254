//! Upload lifecycle core
//!
//! One [`Uploader`] instance tracks one attachment attempt through the full
//! lifecycle: cache the inbound file under a fresh cache id, mirror it into
//! the version tree, run the processing pipeline, persist through the
//! storage backend, and later retrieve by cache name or store identifier.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use futures::future::BoxFuture;
use rand::Rng;
use regex::Regex;
use serde_json::Value;

use portage_core::{SanitizedFile, UploadError, UploadInput, UploadResult};
use portage_storage::UploadPaths;

use crate::definition::UploaderDefinition;

static CACHE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+-\d+-\d+-\d{4})/([A-Za-z0-9._+\-]+)$").expect("valid pattern")
});

/// One attachment attempt against a shared [`UploaderDefinition`].
pub struct Uploader {
    definition: Arc<UploaderDefinition>,
    model: Option<Arc<dyn Any + Send + Sync>>,
    mounted_as: Option<String>,
    file: Option<SanitizedFile>,
    cache_id: Option<String>,
    original_filename: Option<String>,
    versions: Vec<(String, Uploader)>,
    versions_built: bool,
}

impl Uploader {
    pub fn new(definition: Arc<UploaderDefinition>) -> Self {
        Uploader {
            definition,
            model: None,
            mounted_as: None,
            file: None,
            cache_id: None,
            original_filename: None,
            versions: Vec::new(),
            versions_built: false,
        }
    }

    /// Construct an uploader mounted on a model column. The model handle and
    /// column name are carried into every version instance.
    pub fn mounted(
        definition: Arc<UploaderDefinition>,
        model: Arc<dyn Any + Send + Sync>,
        mounted_as: impl Into<String>,
    ) -> Self {
        let mut uploader = Self::new(definition);
        uploader.model = Some(model);
        uploader.mounted_as = Some(mounted_as.into());
        uploader
    }

    pub fn definition(&self) -> &Arc<UploaderDefinition> {
        &self.definition
    }

    pub fn model(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.model.as_ref()
    }

    pub fn mounted_as(&self) -> Option<&str> {
        self.mounted_as.as_deref()
    }

    pub fn file(&self) -> Option<&SanitizedFile> {
        self.file.as_ref()
    }

    pub fn cache_id(&self) -> Option<&str> {
        self.cache_id.as_deref()
    }

    pub fn original_filename(&self) -> Option<&str> {
        self.original_filename.as_deref()
    }

    /// Underscore-joined version path, `None` at the root.
    pub fn version_name(&self) -> Option<String> {
        let names = self.definition.version_names();
        if names.is_empty() {
            None
        } else {
            Some(names.join("_"))
        }
    }

    /// Filename this instance caches and stores under: the sanitized
    /// original, passed through the definition's override when one is set.
    pub fn filename(&self) -> Option<String> {
        let original = self.original_filename.as_deref()?;
        match self.definition.filename_override() {
            Some(f) => Some(f(original)),
            None => Some(original.to_string()),
        }
    }

    /// Identifier the stored file can be retrieved under.
    pub fn identifier(&self) -> Option<String> {
        self.file
            .as_ref()
            .and_then(|f| f.identifier().map(String::from))
            .or_else(|| self.filename())
    }

    /// Cache reference handed to callers for later re-attachment: the cache
    /// id plus the sanitized original filename.
    pub fn cache_name(&self) -> Option<String> {
        match (&self.cache_id, &self.original_filename) {
            (Some(id), Some(name)) => Some(format!("{}/{}", id, name)),
            _ => None,
        }
    }

    /// On-disk cache location for the current cache id and filename.
    pub fn cache_path(&self) -> Option<PathBuf> {
        let cache_id = self.cache_id.as_deref()?;
        let filename = self.filename()?;
        Some(self.cache_path_parts(cache_id, &filename))
    }

    fn cache_path_parts(&self, cache_id: &str, filename: &str) -> PathBuf {
        self.definition
            .config()
            .root
            .join(self.definition.cache_dir())
            .join(cache_id)
            .join(format!("{}{}", self.version_prefix(), filename))
    }

    /// Store key for the current filename.
    pub fn store_path(&self) -> Option<String> {
        self.filename().map(|f| self.store_path_for(&f))
    }

    /// Store key for an arbitrary filename, with this instance's version
    /// prefix applied.
    pub fn store_path_for(&self, for_file: &str) -> String {
        format!(
            "{}/{}{}",
            self.definition.store_dir(),
            self.version_prefix(),
            for_file
        )
    }

    pub fn store_dir(&self) -> &str {
        self.definition.store_dir()
    }

    pub fn cache_dir(&self) -> &str {
        self.definition.cache_dir()
    }

    fn version_prefix(&self) -> String {
        match self.version_name() {
            Some(name) => format!("{}_", name),
            None => String::new(),
        }
    }

    /// Filesystem path of the current file, wherever it lives.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.file.as_ref()?.path().map(Path::to_path_buf)
    }

    /// Public URL: the backend's URL when it reports one, otherwise the
    /// current path relative to the public root.
    pub fn url(&self) -> Option<String> {
        let file = self.file.as_ref()?;
        if let Some(url) = file.url() {
            if !url.is_empty() {
                return Some(url.to_string());
            }
        }
        let path = file.path()?;
        let rel = path
            .strip_prefix(&self.definition.config().root)
            .unwrap_or(path);
        Some(format!("/{}", rel.display()))
    }

    pub async fn is_blank(&self) -> bool {
        match &self.file {
            Some(file) => file.is_empty().await,
            None => true,
        }
    }

    /// Version instance by name, building the version tree on first access.
    pub fn version(&mut self, name: &str) -> Option<&mut Uploader> {
        self.ensure_versions();
        self.versions
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, uploader)| uploader)
    }

    pub fn versions(&mut self) -> &[(String, Uploader)] {
        self.ensure_versions();
        &self.versions
    }

    fn ensure_versions(&mut self) {
        if self.versions_built {
            return;
        }
        for (name, def) in self.definition.versions() {
            let mut child = Uploader::new(def.clone());
            child.model = self.model.clone();
            child.mounted_as = self.mounted_as.clone();
            self.versions.push((name.clone(), child));
        }
        self.versions_built = true;
    }

    /// Cache an inbound file: sanitize the filename, check the extension
    /// whitelist, move the content under a fresh cache id, mirror into every
    /// version, then run the processing pipeline.
    ///
    /// Empty input is a no-op. A bare path fails with `FormNotMultipart`.
    pub async fn cache(&mut self, input: UploadInput) -> UploadResult<()> {
        self.cache_inner(input, None).await
    }

    fn cache_inner(
        &mut self,
        input: UploadInput,
        shared_cache_id: Option<String>,
    ) -> BoxFuture<'_, UploadResult<()>> {
        Box::pin(async move {
            if input.is_empty() {
                return Ok(());
            }
            let mut file = SanitizedFile::from_input(input.clone())?;
            let original = file.filename().ok_or_else(|| {
                UploadError::InvalidParameter("upload has no usable filename".to_string())
            })?;
            self.check_extension(&file)?;

            let cache_id = shared_cache_id.unwrap_or_else(generate_cache_id);
            self.cache_id = Some(cache_id.clone());
            self.original_filename = Some(original);

            let cached_name = self.filename().ok_or_else(|| {
                UploadError::InvalidParameter("upload has no usable filename".to_string())
            })?;
            let dest = self.cache_path_parts(&cache_id, &cached_name);
            let permissions = self.definition.config().permissions;
            file.move_to(&dest, permissions).await?;

            tracing::info!(
                cache_id = %cache_id,
                path = %dest.display(),
                version = self.version_name().as_deref().unwrap_or(""),
                "file cached"
            );
            self.file = Some(file);

            self.ensure_versions();
            for (_, child) in self.versions.iter_mut() {
                child
                    .cache_inner(input.clone(), Some(cache_id.clone()))
                    .await?;
            }

            self.process_all()
        })
    }

    /// Re-attach a previously cached file by its cache name.
    ///
    /// An invalid cache name resets the instance and fails; nothing touches
    /// the filesystem, so a stale cache only surfaces when the file is read.
    pub fn retrieve_from_cache_strict(&mut self, cache_name: &str) -> UploadResult<()> {
        let Some(caps) = CACHE_NAME_RE.captures(cache_name) else {
            self.file = None;
            self.cache_id = None;
            self.original_filename = None;
            return Err(UploadError::InvalidParameter(format!(
                "invalid cache id: {}",
                cache_name
            )));
        };
        self.cache_id = Some(caps[1].to_string());
        self.original_filename = Some(caps[2].to_string());
        if let Some(path) = self.cache_path() {
            self.file = Some(SanitizedFile::at_path(path));
        }
        self.ensure_versions();
        for (_, child) in self.versions.iter_mut() {
            child.retrieve_from_cache_strict(cache_name)?;
        }
        Ok(())
    }

    /// Non-strict variant: does nothing when a file is already attached, and
    /// swallows invalid cache names, leaving prior state intact.
    pub fn retrieve_from_cache(&mut self, cache_name: &str) {
        if self.file.is_some() {
            return;
        }
        let prev_cache_id = self.cache_id.clone();
        let prev_original = self.original_filename.clone();
        if let Err(UploadError::InvalidParameter(_)) = self.retrieve_from_cache_strict(cache_name) {
            self.cache_id = prev_cache_id;
            self.original_filename = prev_original;
        }
    }

    /// Persist the given input through the storage backend, caching it first
    /// (or staging it in memory when the cache is disabled).
    pub async fn store(&mut self, input: UploadInput) -> UploadResult<()> {
        self.store_inner(Some(input)).await
    }

    /// Persist whatever file is currently attached; no-op when none is.
    pub async fn store_cached(&mut self) -> UploadResult<()> {
        self.store_inner(None).await
    }

    fn store_inner(&mut self, input: Option<UploadInput>) -> BoxFuture<'_, UploadResult<()>> {
        Box::pin(async move {
            if let Some(input) = input {
                if !input.is_empty() {
                    if self.definition.config().use_cache {
                        self.cache_inner(input, None).await?;
                    } else {
                        self.stage_direct(input)?;
                    }
                }
            }

            let Some(file) = self.file.clone() else {
                return Ok(());
            };
            let storage = self.definition.storage();
            let start = Instant::now();
            let stored = storage.store(&*self, &file).await?;

            tracing::info!(
                identifier = stored.identifier.as_deref().unwrap_or(""),
                backend = %storage.kind(),
                version = self.version_name().as_deref().unwrap_or(""),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "file stored"
            );

            self.file = Some(SanitizedFile::stored(stored));
            self.cache_id = None;

            self.ensure_versions();
            for (_, child) in self.versions.iter_mut() {
                child.store_inner(None).await?;
            }
            Ok(())
        })
    }

    /// Stage an inbound file without writing it to the cache directory: same
    /// validation, versioning and processing as caching, but the content
    /// stays in memory and no cache id is assigned.
    fn stage_direct(&mut self, input: UploadInput) -> UploadResult<()> {
        if input.is_empty() {
            return Ok(());
        }
        let file = SanitizedFile::from_input(input.clone())?;
        let original = file.filename().ok_or_else(|| {
            UploadError::InvalidParameter("upload has no usable filename".to_string())
        })?;
        self.check_extension(&file)?;

        self.cache_id = None;
        self.original_filename = Some(original);
        self.file = Some(file);

        self.ensure_versions();
        for (_, child) in self.versions.iter_mut() {
            child.stage_direct(input.clone())?;
        }
        self.process_all()
    }

    /// Re-attach a stored file by its identifier, recursing into versions.
    /// The filename is left unset; the stored handle carries the identity.
    pub async fn retrieve_from_store_strict(&mut self, identifier: &str) -> UploadResult<()> {
        self.retrieve_store_inner(identifier).await
    }

    /// Non-strict variant: does nothing when a file is already attached.
    pub async fn retrieve_from_store(&mut self, identifier: &str) -> UploadResult<()> {
        if self.file.is_some() {
            return Ok(());
        }
        self.retrieve_store_inner(identifier).await
    }

    fn retrieve_store_inner<'a>(
        &'a mut self,
        identifier: &'a str,
    ) -> BoxFuture<'a, UploadResult<()>> {
        Box::pin(async move {
            let storage = self.definition.storage();
            let stored = storage.retrieve(&*self, identifier).await?;
            self.file = Some(SanitizedFile::stored(stored));

            self.ensure_versions();
            for (_, child) in self.versions.iter_mut() {
                child.retrieve_store_inner(identifier).await?;
            }
            Ok(())
        })
    }

    fn check_extension(&self, file: &SanitizedFile) -> UploadResult<()> {
        let Some(allowed) = self.definition.extension_white_list() else {
            return Ok(());
        };
        let ext = file.extension().unwrap_or_default();
        if allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
            Ok(())
        } else {
            Err(UploadError::Integrity(format!(
                "you are not allowed to upload \"{}\" files, allowed types: {}",
                ext,
                allowed.join(", ")
            )))
        }
    }

    /// Run the definition's pipeline against this instance, in registration
    /// order. An entry with no registered processor fails the whole run.
    fn process_all(&mut self) -> UploadResult<()> {
        let pipeline: Vec<(String, Vec<Value>)> = self.definition.processors().to_vec();
        for (name, args) in pipeline {
            let f = self
                .definition
                .processor(&name)
                .ok_or_else(|| UploadError::UnknownProcessor(name.clone()))?;
            f(self, &args).map_err(|source| UploadError::Processing { name, source })?;
        }
        Ok(())
    }
}

impl UploadPaths for Uploader {
    fn root(&self) -> &Path {
        &self.definition.config().root
    }

    fn store_path(&self) -> Option<String> {
        Uploader::store_path(self)
    }

    fn store_path_for(&self, for_file: &str) -> String {
        Uploader::store_path_for(self, for_file)
    }

    fn filename(&self) -> Option<String> {
        Uploader::filename(self)
    }
}

/// Renders as [`Uploader::url`], or the empty string when no file is
/// attached. Callers that need to distinguish "no file" from a blank URL
/// should use `url()` directly.
impl fmt::Display for Uploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url().unwrap_or_default())
    }
}

/// `{date}-{pid}-{counter}-{random}`, matching the cache name pattern.
fn generate_cache_id() -> String {
    let mut rng = rand::rng();
    format!(
        "{}-{}-{}-{:04}",
        chrono::Utc::now().format("%Y%m%d"),
        std::process::id(),
        rng.random_range(0..1000u32),
        rng.random_range(1000..10000u32)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::UploaderBuilder;

    fn uploader() -> Uploader {
        Uploader::new(UploaderBuilder::new().build().unwrap())
    }

    #[test]
    fn test_cache_id_matches_cache_name_pattern() {
        let id = generate_cache_id();
        let name = format!("{}/test.jpg", id);
        assert!(CACHE_NAME_RE.is_match(&name), "unexpected id: {}", id);
    }

    #[test]
    fn test_store_path_includes_version_prefix() {
        let mut builder = UploaderBuilder::new();
        builder.version("thumb", |_| {});
        let mut uploader = Uploader::new(builder.build().unwrap());
        uploader.original_filename = Some("test.jpg".to_string());
        let thumb = uploader.version("thumb").unwrap();
        thumb.original_filename = Some("test.jpg".to_string());

        assert_eq!(thumb.store_path().unwrap(), "uploads/thumb_test.jpg");
        assert_eq!(uploader.store_path().unwrap(), "uploads/test.jpg");
    }

    #[test]
    fn test_filename_override_applies() {
        let mut builder = UploaderBuilder::new();
        builder.filename(|original| format!("arg-{}", original));
        let mut uploader = Uploader::new(builder.build().unwrap());
        uploader.original_filename = Some("test.jpg".to_string());

        assert_eq!(uploader.filename().unwrap(), "arg-test.jpg");
        // the cache name keeps the sanitized original
        uploader.cache_id = Some("20071201-1234-1-2255".to_string());
        assert_eq!(
            uploader.cache_name().unwrap(),
            "20071201-1234-1-2255/test.jpg"
        );
    }

    #[test]
    fn test_nested_version_name() {
        let mut builder = UploaderBuilder::new();
        builder.version("thumb", |v| {
            v.version("mini", |_| {});
        });
        let mut uploader = Uploader::new(builder.build().unwrap());

        let thumb = uploader.version("thumb").unwrap();
        assert_eq!(thumb.version_name().unwrap(), "thumb");
        let mini = thumb.version("mini").unwrap();
        assert_eq!(mini.version_name().unwrap(), "thumb_mini");
        assert_eq!(uploader.version_name(), None);
    }

    #[test]
    fn test_retrieve_from_cache_strict_rejects_malformed_names() {
        // wrong-format id, path traversal, glob characters
        for bad in [
            "bogus",
            "12345/test.jpeg",
            "20071201-1234-1-2255/te/st.jpeg",
            "20071201-1234-1-2255/te??%st.jpeg",
        ] {
            let mut uploader = uploader();
            uploader
                .retrieve_from_cache_strict("20071201-1234-1-2255/test.jpeg")
                .unwrap();

            let result = uploader.retrieve_from_cache_strict(bad);
            assert!(
                matches!(result, Err(UploadError::InvalidParameter(_))),
                "accepted {:?}",
                bad
            );
            assert!(uploader.file().is_none());
            assert!(uploader.cache_id().is_none());
            assert!(uploader.cache_name().is_none());
        }
    }

    #[test]
    fn test_retrieve_from_cache_strict_sets_identity() {
        let mut uploader = uploader();
        uploader
            .retrieve_from_cache_strict("20071201-1234-1-2255/test.jpeg")
            .unwrap();

        assert_eq!(uploader.cache_id().unwrap(), "20071201-1234-1-2255");
        assert_eq!(uploader.original_filename().unwrap(), "test.jpeg");
        assert_eq!(
            uploader.current_path().unwrap(),
            PathBuf::from("public/uploads/tmp/20071201-1234-1-2255/test.jpeg")
        );
    }

    #[test]
    fn test_retrieve_from_cache_skips_when_file_present() {
        let mut uploader = uploader();
        uploader
            .retrieve_from_cache_strict("20071201-1234-1-2255/test.jpeg")
            .unwrap();
        uploader.retrieve_from_cache("20071201-1234-1-2256/other.jpeg");

        assert_eq!(uploader.original_filename().unwrap(), "test.jpeg");
    }

    #[test]
    fn test_retrieve_from_cache_swallows_invalid_name() {
        let mut uploader = uploader();
        uploader.retrieve_from_cache("bogus");
        assert!(uploader.file().is_none());
        assert!(uploader.cache_id().is_none());
    }

    #[test]
    fn test_unknown_processor_fails_pipeline() {
        let mut builder = UploaderBuilder::new();
        builder.process("vanish");
        let mut uploader = Uploader::new(builder.build().unwrap());

        let result = uploader.process_all();
        assert!(matches!(result, Err(UploadError::UnknownProcessor(name)) if name == "vanish"));
    }
}
