use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;

/// Storage backend kinds
///
/// Shortcut names resolved by the storage factory. Defined in core because
/// both the uploader and the storage crate need to name backends without a
/// dependency cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    File,
    S3,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "s3" => Ok(StorageKind::S3),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageKind::File => write!(f, "file"),
            StorageKind::S3 => write!(f, "s3"),
        }
    }
}

/// Handle returned by a storage backend after `store` or `retrieve`.
///
/// Whatever the backend hands back replaces the uploader's cached file, so
/// the fields mirror the sanitized handle's accessors: a local path when the
/// backend has one, a public URL when it can serve one, and the identifier
/// the file can later be retrieved under.
#[derive(Clone, Debug, Default)]
pub struct StoredFile {
    pub path: Option<PathBuf>,
    pub url: Option<String>,
    pub identifier: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        assert_eq!("file".parse::<StorageKind>().unwrap(), StorageKind::File);
        assert_eq!("S3".parse::<StorageKind>().unwrap(), StorageKind::S3);
        assert_eq!(StorageKind::File.to_string(), "file");
        assert!("nfs".parse::<StorageKind>().is_err());
    }
}
