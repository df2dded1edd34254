//! Uploader definitions and the version registry
//!
//! A definition is the per-"class" configuration of an uploader: its place
//! in the version tree, its processing pipeline, its storage backend, and
//! its overrides. Definitions are immutable once built; runtime class
//! generation from the original design becomes a tree of these descriptors
//! assembled by [`UploaderBuilder`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use portage_core::{StorageKind, UploaderConfig};
use portage_storage::{factory, Storage, StorageResult};

use crate::uploader::Uploader;

/// Named callable invoked by the processing pipeline against an uploader
/// instance. Processors are opaque to the core; whatever they do to the
/// instance's file is their business.
pub type ProcessorFn = Arc<dyn Fn(&mut Uploader, &[Value]) -> anyhow::Result<()> + Send + Sync>;

/// Filename override strategy. Receives the sanitized original filename;
/// the result drives cache-path and store-path computation.
pub type FilenameFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Builder for [`UploaderDefinition`] trees.
///
/// Registering a version snapshots the current builder state into a child
/// (the subclass-copies-parent semantics), so configuration added to the
/// parent afterwards does not leak into already-registered versions.
#[derive(Clone, Default)]
pub struct UploaderBuilder {
    config: Arc<UploaderConfig>,
    version_names: Vec<String>,
    versions: Vec<(String, UploaderBuilder)>,
    processors: Vec<(String, Vec<Value>)>,
    processor_registry: HashMap<String, ProcessorFn>,
    storage: Option<Arc<dyn Storage>>,
    setup_done: HashSet<StorageKind>,
    filename_override: Option<FilenameFn>,
    extension_white_list: Option<Vec<String>>,
    store_dir: Option<String>,
    cache_dir: Option<String>,
}

impl UploaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: UploaderConfig) -> Self {
        UploaderBuilder {
            config: Arc::new(config),
            ..Self::default()
        }
    }

    /// Register a version, or re-open it when `name` is already registered.
    ///
    /// The first call for a name copies the current builder state (minus the
    /// nested version map) into a child and appends `name` to its version
    /// path; later calls apply `f` cumulatively to the existing child.
    pub fn version(&mut self, name: impl Into<String>, f: impl FnOnce(&mut UploaderBuilder)) -> &mut Self {
        let name = name.into();
        if let Some((_, child)) = self.versions.iter_mut().find(|(n, _)| *n == name) {
            f(child);
        } else {
            let mut child = self.clone();
            child.versions.clear();
            child.setup_done.clear();
            child.version_names.push(name.clone());
            f(&mut child);
            self.versions.push((name, child));
        }
        self
    }

    /// Append a zero-argument processor invocation to the pipeline.
    pub fn process(&mut self, name: impl Into<String>) -> &mut Self {
        self.processors.push((name.into(), Vec::new()));
        self
    }

    /// Append a processor invocation with arguments to the pipeline.
    pub fn process_with(&mut self, name: impl Into<String>, args: Vec<Value>) -> &mut Self {
        self.processors.push((name.into(), args));
        self
    }

    /// Register the callable a pipeline entry resolves to.
    pub fn processor(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&mut Uploader, &[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.processor_registry.insert(name.into(), Arc::new(f));
        self
    }

    /// Set the storage backend directly, running its setup unless the same
    /// backend kind was already set up for this definition.
    pub fn storage(&mut self, backend: Arc<dyn Storage>) -> StorageResult<&mut Self> {
        if self.setup_done.insert(backend.kind()) {
            backend.setup()?;
        }
        self.storage = Some(backend);
        Ok(self)
    }

    /// Set the storage backend through the shortcut mapping.
    pub fn storage_kind(&mut self, kind: StorageKind) -> StorageResult<&mut Self> {
        let backend = factory::resolve(kind, &self.config)?;
        self.storage(backend)
    }

    /// Override how the filename is derived from the sanitized original.
    pub fn filename(&mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> &mut Self {
        self.filename_override = Some(Arc::new(f));
        self
    }

    /// Restrict cacheable files to the given extensions (case-insensitive).
    pub fn extension_white_list<I, S>(&mut self, extensions: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extension_white_list = Some(extensions.into_iter().map(Into::into).collect());
        self
    }

    pub fn store_dir(&mut self, dir: impl Into<String>) -> &mut Self {
        self.store_dir = Some(dir.into());
        self
    }

    pub fn cache_dir(&mut self, dir: impl Into<String>) -> &mut Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Finalize the definition tree. A definition with no backend assigned
    /// falls back to the local `file` backend, running its setup lazily
    /// here, exactly once; versions inherit the parent's resolved backend.
    pub fn build(self) -> StorageResult<Arc<UploaderDefinition>> {
        Ok(Arc::new(self.build_node(None)?))
    }

    fn build_node(self, inherited: Option<Arc<dyn Storage>>) -> StorageResult<UploaderDefinition> {
        let UploaderBuilder {
            config,
            version_names,
            versions,
            processors,
            processor_registry,
            storage,
            mut setup_done,
            filename_override,
            extension_white_list,
            store_dir,
            cache_dir,
        } = self;

        let storage = match storage {
            Some(backend) => backend,
            None => match inherited {
                Some(backend) => backend,
                None => {
                    let backend = factory::resolve(StorageKind::File, &config)?;
                    if setup_done.insert(backend.kind()) {
                        backend.setup()?;
                    }
                    backend
                }
            },
        };

        let mut built = Vec::with_capacity(versions.len());
        for (name, child) in versions {
            built.push((name, Arc::new(child.build_node(Some(storage.clone()))?)));
        }

        Ok(UploaderDefinition {
            config,
            version_names,
            versions: built,
            processors,
            processor_registry,
            storage,
            filename_override,
            extension_white_list,
            store_dir,
            cache_dir,
        })
    }
}

/// Immutable per-class configuration: one node in the version tree.
pub struct UploaderDefinition {
    config: Arc<UploaderConfig>,
    version_names: Vec<String>,
    versions: Vec<(String, Arc<UploaderDefinition>)>,
    processors: Vec<(String, Vec<Value>)>,
    processor_registry: HashMap<String, ProcessorFn>,
    storage: Arc<dyn Storage>,
    filename_override: Option<FilenameFn>,
    extension_white_list: Option<Vec<String>>,
    store_dir: Option<String>,
    cache_dir: Option<String>,
}

impl UploaderDefinition {
    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// This node's path in the version tree; empty at the root.
    pub fn version_names(&self) -> &[String] {
        &self.version_names
    }

    pub fn versions(&self) -> &[(String, Arc<UploaderDefinition>)] {
        &self.versions
    }

    pub fn processors(&self) -> &[(String, Vec<Value>)] {
        &self.processors
    }

    pub fn processor(&self, name: &str) -> Option<ProcessorFn> {
        self.processor_registry.get(name).cloned()
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    pub fn filename_override(&self) -> Option<&FilenameFn> {
        self.filename_override.as_ref()
    }

    pub fn extension_white_list(&self) -> Option<&[String]> {
        self.extension_white_list.as_deref()
    }

    pub fn store_dir(&self) -> &str {
        self.store_dir.as_deref().unwrap_or(&self.config.store_dir)
    }

    pub fn cache_dir(&self) -> &str {
        self.cache_dir.as_deref().unwrap_or(&self.config.cache_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_snapshots_parent_state() {
        let mut builder = UploaderBuilder::new();
        builder.process("sepiatone");
        builder.version("thumb", |_| {});
        builder.process("desaturate");
        let def = builder.build().unwrap();

        let (name, thumb) = &def.versions()[0];
        assert_eq!(name, "thumb");
        assert_eq!(thumb.version_names(), ["thumb"]);
        // registered after the snapshot, so the version does not see it
        assert_eq!(thumb.processors().len(), 1);
        assert_eq!(def.processors().len(), 2);
    }

    #[test]
    fn test_version_reopens_cumulatively() {
        let mut builder = UploaderBuilder::new();
        builder.version("thumb", |v| {
            v.store_dir("monkey/apache");
        });
        builder.version("thumb", |v| {
            v.extension_white_list(["jpg"]);
        });
        let def = builder.build().unwrap();

        assert_eq!(def.versions().len(), 1);
        let thumb = &def.versions()[0].1;
        assert_eq!(thumb.store_dir(), "monkey/apache");
        assert_eq!(thumb.extension_white_list().unwrap(), ["jpg"]);
    }

    #[test]
    fn test_nested_version_names() {
        let mut builder = UploaderBuilder::new();
        builder.version("thumb", |v| {
            v.version("mini", |_| {});
            v.version("micro", |_| {});
        });
        let def = builder.build().unwrap();

        let thumb = &def.versions()[0].1;
        assert_eq!(thumb.version_names(), ["thumb"]);
        assert_eq!(thumb.versions()[0].1.version_names(), ["thumb", "mini"]);
        assert_eq!(thumb.versions()[1].1.version_names(), ["thumb", "micro"]);
    }

    #[test]
    fn test_default_storage_is_file() {
        let def = UploaderBuilder::new().build().unwrap();
        assert_eq!(def.storage().kind(), StorageKind::File);
    }

    #[test]
    fn test_dir_overrides_fall_back_to_config() {
        let mut builder = UploaderBuilder::new();
        builder.version("thumb", |v| {
            v.store_dir("elsewhere");
        });
        let def = builder.build().unwrap();

        assert_eq!(def.store_dir(), "uploads");
        assert_eq!(def.cache_dir(), "uploads/tmp");
        assert_eq!(def.versions()[0].1.store_dir(), "elsewhere");
    }
}
