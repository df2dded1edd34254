//! Sanitized file handle
//!
//! A thin, backend-agnostic wrapper around "a file-like thing": an open
//! upload stream, a path the engine itself placed a file at, or the handle a
//! storage backend returned. Every lifecycle operation goes through this
//! type, so filename sanitization and the move/copy/delete primitives live
//! here and nowhere else.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use bytes::Bytes;
use regex::Regex;
use tokio::fs;

use crate::error::{UploadError, UploadResult};
use crate::storage_types::StoredFile;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.\-]").expect("valid pattern"));

/// Raw input handed to the lifecycle core by a caller.
#[derive(Clone, Debug)]
pub enum UploadInput {
    /// Absent input. Accepted everywhere as the empty-file sentinel, never
    /// an error.
    None,
    /// An open upload stream: content plus the client-supplied filename.
    Stream {
        content: Bytes,
        original_filename: String,
    },
    /// A bare filesystem path. The lifecycle core rejects these with
    /// `FormNotMultipart` so arbitrary local paths cannot be ingested.
    Path(PathBuf),
}

impl UploadInput {
    pub fn stream(content: impl Into<Bytes>, original_filename: impl Into<String>) -> Self {
        UploadInput::Stream {
            content: content.into(),
            original_filename: original_filename.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            UploadInput::None => true,
            UploadInput::Stream { content, .. } => content.is_empty(),
            UploadInput::Path(_) => false,
        }
    }
}

#[derive(Clone, Debug)]
enum FileSource {
    Empty,
    Stream {
        content: Bytes,
        original_filename: String,
    },
    Local(PathBuf),
    Stored(StoredFile),
}

/// A sanitized, uniform view of one file as it moves through the lifecycle.
#[derive(Clone, Debug)]
pub struct SanitizedFile {
    source: FileSource,
}

impl SanitizedFile {
    /// The empty-file sentinel.
    pub fn empty() -> Self {
        SanitizedFile {
            source: FileSource::Empty,
        }
    }

    /// Wrap a raw upload input.
    ///
    /// A bare path fails with `FormNotMultipart`: callers must supply an
    /// open content stream, not a path string.
    pub fn from_input(input: UploadInput) -> UploadResult<Self> {
        match input {
            UploadInput::None => Ok(Self::empty()),
            UploadInput::Stream {
                content,
                original_filename,
            } => Ok(SanitizedFile {
                source: FileSource::Stream {
                    content,
                    original_filename,
                },
            }),
            UploadInput::Path(_) => Err(UploadError::FormNotMultipart),
        }
    }

    /// Wrap a path the engine itself computed (cache or store layout).
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        SanitizedFile {
            source: FileSource::Local(path.into()),
        }
    }

    /// Wrap the handle a storage backend returned.
    pub fn stored(file: StoredFile) -> Self {
        SanitizedFile {
            source: FileSource::Stored(file),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            FileSource::Local(path) => Some(path),
            FileSource::Stored(stored) => stored.path.as_deref(),
            _ => None,
        }
    }

    /// Public URL, if the backing store provided one.
    pub fn url(&self) -> Option<&str> {
        match &self.source {
            FileSource::Stored(stored) => stored.url.as_deref(),
            _ => None,
        }
    }

    /// Identifier the file can be retrieved under, if stored.
    pub fn identifier(&self) -> Option<&str> {
        match &self.source {
            FileSource::Stored(stored) => stored.identifier.as_deref(),
            _ => None,
        }
    }

    /// Sanitized basename: characters outside `[A-Za-z0-9_.\-]` stripped,
    /// leading dots stripped, `None` when nothing survives.
    pub fn filename(&self) -> Option<String> {
        let raw = match &self.source {
            FileSource::Empty => return None,
            FileSource::Stream {
                original_filename, ..
            } => original_filename.as_str(),
            FileSource::Local(path) => path.file_name()?.to_str()?,
            FileSource::Stored(stored) => stored
                .identifier
                .as_deref()
                .or_else(|| stored.path.as_deref()?.file_name()?.to_str())?,
        };
        sanitize(raw)
    }

    /// Extension of the sanitized filename, without the dot.
    pub fn extension(&self) -> Option<String> {
        let name = self.filename()?;
        let (_, ext) = name.rsplit_once('.')?;
        if ext.is_empty() {
            None
        } else {
            Some(ext.to_string())
        }
    }

    pub async fn exists(&self) -> bool {
        match &self.source {
            FileSource::Empty => false,
            FileSource::Stream { content, .. } => !content.is_empty(),
            FileSource::Local(path) => fs::try_exists(path).await.unwrap_or(false),
            FileSource::Stored(stored) => match &stored.path {
                Some(path) => fs::try_exists(path).await.unwrap_or(false),
                None => true,
            },
        }
    }

    /// True when absent, zero-length, or pointing at a blank path.
    pub async fn is_empty(&self) -> bool {
        match &self.source {
            FileSource::Empty => true,
            FileSource::Stream { content, .. } => content.is_empty(),
            FileSource::Local(path) => match fs::metadata(path).await {
                Ok(meta) => meta.len() == 0,
                Err(_) => true,
            },
            FileSource::Stored(_) => false,
        }
    }

    /// Read the full content.
    pub async fn content(&self) -> UploadResult<Bytes> {
        match &self.source {
            FileSource::Empty => Ok(Bytes::new()),
            FileSource::Stream { content, .. } => Ok(content.clone()),
            FileSource::Local(path) => fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|e| UploadError::from_io(path, e)),
            FileSource::Stored(stored) => match &stored.path {
                Some(path) => fs::read(path)
                    .await
                    .map(Bytes::from)
                    .map_err(|e| UploadError::from_io(path, e)),
                None => Ok(Bytes::new()),
            },
        }
    }

    /// Move the file to `dest`, creating parent directories and applying
    /// `permissions` when given. The handle points at `dest` afterwards.
    pub async fn move_to(&mut self, dest: &Path, permissions: Option<u32>) -> UploadResult<()> {
        match &self.source {
            FileSource::Empty => return Ok(()),
            FileSource::Stream { content, .. } => {
                ensure_parent_dir(dest).await?;
                fs::write(dest, content)
                    .await
                    .map_err(|e| UploadError::from_io(dest, e))?;
            }
            FileSource::Local(src) | FileSource::Stored(StoredFile { path: Some(src), .. }) => {
                if src != dest {
                    ensure_parent_dir(dest).await?;
                    // rename fails across filesystems; fall back to copy + remove
                    if fs::rename(src, dest).await.is_err() {
                        fs::copy(src, dest)
                            .await
                            .map_err(|e| UploadError::from_io(dest, e))?;
                        fs::remove_file(src)
                            .await
                            .map_err(|e| UploadError::from_io(src, e))?;
                    }
                }
            }
            FileSource::Stored(_) => return Ok(()),
        }
        apply_permissions(dest, permissions).await?;
        self.source = FileSource::Local(dest.to_path_buf());
        Ok(())
    }

    /// Copy the file to `dest`, returning a new handle for the copy. The
    /// receiver is left untouched.
    pub async fn copy_to(&self, dest: &Path, permissions: Option<u32>) -> UploadResult<Self> {
        match &self.source {
            FileSource::Empty => return Ok(Self::empty()),
            FileSource::Stream { content, .. } => {
                ensure_parent_dir(dest).await?;
                fs::write(dest, content)
                    .await
                    .map_err(|e| UploadError::from_io(dest, e))?;
            }
            FileSource::Local(src) | FileSource::Stored(StoredFile { path: Some(src), .. }) => {
                if src != dest {
                    ensure_parent_dir(dest).await?;
                    fs::copy(src, dest)
                        .await
                        .map_err(|e| UploadError::from_io(dest, e))?;
                }
            }
            FileSource::Stored(_) => return Ok(Self::empty()),
        }
        apply_permissions(dest, permissions).await?;
        Ok(Self::at_path(dest))
    }

    /// Delete the underlying file, leaving the empty sentinel behind.
    pub async fn delete(&mut self) -> UploadResult<()> {
        if let FileSource::Local(path) = &self.source {
            if fs::try_exists(path).await.unwrap_or(false) {
                fs::remove_file(path)
                    .await
                    .map_err(|e| UploadError::from_io(path, e))?;
            }
        }
        self.source = FileSource::Empty;
        Ok(())
    }
}

fn sanitize(raw: &str) -> Option<String> {
    let base = Path::new(raw).file_name()?.to_str()?;
    let stripped = UNSAFE_CHARS.replace_all(base, "");
    let stripped = stripped.trim_start_matches('.');
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

async fn ensure_parent_dir(path: &Path) -> UploadResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| UploadError::from_io(parent, e))?;
    }
    Ok(())
}

async fn apply_permissions(path: &Path, permissions: Option<u32>) -> UploadResult<()> {
    #[cfg(unix)]
    if let Some(mode) = permissions {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| UploadError::from_io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = permissions;
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn stream(name: &str) -> SanitizedFile {
        SanitizedFile::from_input(UploadInput::stream(&b"contents"[..], name)).unwrap()
    }

    #[test]
    fn test_sanitizes_filename() {
        assert_eq!(stream("test.jpg").filename().unwrap(), "test.jpg");
        assert_eq!(stream("te st.jpg").filename().unwrap(), "test.jpg");
        assert_eq!(stream("te??%st.jpg").filename().unwrap(), "test.jpg");
        assert_eq!(stream("path/to/test.jpg").filename().unwrap(), "test.jpg");
        assert_eq!(stream("..hidden").filename().unwrap(), "hidden");
        assert_eq!(stream("???").filename(), None);
    }

    #[test]
    fn test_extension() {
        assert_eq!(stream("test.jpg").extension().unwrap(), "jpg");
        assert_eq!(stream("archive.tar.gz").extension().unwrap(), "gz");
        assert_eq!(stream("noext").extension(), None);
    }

    #[test]
    fn test_bare_path_is_rejected() {
        let result = SanitizedFile::from_input(UploadInput::Path("/tmp/test.jpg".into()));
        assert!(matches!(result, Err(UploadError::FormNotMultipart)));
    }

    #[test]
    fn test_none_is_empty_sentinel() {
        let file = SanitizedFile::from_input(UploadInput::None).unwrap();
        assert_eq!(file.filename(), None);
        assert_eq!(file.path(), None);
    }

    #[tokio::test]
    async fn test_move_to_writes_stream_and_repoints() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("nested/dir/test.jpg");

        let mut file = stream("test.jpg");
        file.move_to(&dest, None).await.unwrap();

        assert_eq!(file.path().unwrap(), dest);
        assert!(file.exists().await);
        assert_eq!(&file.content().await.unwrap()[..], b"contents");
    }

    #[tokio::test]
    async fn test_move_to_renames_local_file() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.jpg");
        let dest = dir.path().join("dest.jpg");
        tokio::fs::write(&src, b"data").await.unwrap();

        let mut file = SanitizedFile::at_path(&src);
        file.move_to(&dest, None).await.unwrap();

        assert!(!tokio::fs::try_exists(&src).await.unwrap());
        assert!(tokio::fs::try_exists(&dest).await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_move_to_applies_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("test.jpg");

        let mut file = stream("test.jpg");
        file.move_to(&dest, Some(0o777)).await.unwrap();

        let mode = tokio::fs::metadata(&dest).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
    }

    #[tokio::test]
    async fn test_copy_to_leaves_original() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.jpg");
        let dest = dir.path().join("dest.jpg");
        tokio::fs::write(&src, b"data").await.unwrap();

        let file = SanitizedFile::at_path(&src);
        let copy = file.copy_to(&dest, None).await.unwrap();

        assert_eq!(file.path().unwrap(), src);
        assert_eq!(copy.path().unwrap(), dest);
        assert!(tokio::fs::try_exists(&src).await.unwrap());
        assert!(tokio::fs::try_exists(&dest).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doomed.jpg");
        tokio::fs::write(&path, b"data").await.unwrap();

        let mut file = SanitizedFile::at_path(&path);
        file.delete().await.unwrap();

        assert!(!tokio::fs::try_exists(&path).await.unwrap());
        assert!(file.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_local_file_is_empty() {
        let file = SanitizedFile::at_path("/nonexistent/portage/test.jpg");
        assert!(file.is_empty().await);
        assert!(!file.exists().await);
    }

    #[test]
    fn test_stored_file_accessors() {
        let file = SanitizedFile::stored(StoredFile {
            path: Some("/path/to/somewhere".into()),
            url: Some("http://www.example.com".to_string()),
            identifier: Some("this-is-me".to_string()),
        });
        assert_eq!(file.path().unwrap(), Path::new("/path/to/somewhere"));
        assert_eq!(file.url().unwrap(), "http://www.example.com");
        assert_eq!(file.identifier().unwrap(), "this-is-me");
    }
}
