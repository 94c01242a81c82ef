use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// The primary error type for all operations in the `fsarmor` crate.
///
/// Every variant is fatal to the Split/Join/Verify call that produced it: the
/// call returns immediately and the tree is left in whatever state it reached.
#[derive(Debug, Error)]
pub enum ArmorError {
    /// An I/O error occurred while reading or writing the stream or the tree.
    /// Includes the path where the error happened (empty for stream errors).
    #[error("I/O error on path '{}': {source}", path.display())]
    Io { source: io::Error, path: PathBuf },

    /// A metadata key could not be decoded back into a path.
    #[error("malformed annotation '{annotation}': {reason}")]
    MalformedAnnotation { annotation: String, reason: &'static str },

    /// A data-subtree entry has no metadata record.
    #[error("no metadata record for '{path}' (expected at '{}')", record.display())]
    MissingMetadata { path: String, record: PathBuf },

    /// A metadata file exists but holds no archive header.
    #[error("metadata record '{}' is empty", record.display())]
    EmptyRecord { record: PathBuf },

    /// An archive entry name that cannot be placed safely inside the data root.
    #[error("unsafe entry name '{name}': {reason}")]
    UnsafeEntryName { name: String, reason: &'static str },

    /// A regular data file does not hold as many bytes as its record declares.
    #[error("size mismatch for '{path}': record declares {declared} bytes, data file holds {actual}")]
    SizeMismatch { path: String, declared: u64, actual: u64 },

    /// A record is stored under a key that does not belong to its entry name.
    #[error("record under key '{key}' names '{name}'")]
    KeyMismatch { key: String, name: String },

    /// The on-disk kind of a data entry contradicts its record.
    #[error("'{path}' is a {on_disk} in the data tree but its record says {recorded}")]
    TypeMismatch { path: String, on_disk: &'static str, recorded: &'static str },
}

pub type Result<T> = std::result::Result<T, ArmorError>;

// Generic IO error conversion that doesn't require a path
impl From<io::Error> for ArmorError {
    fn from(err: io::Error) -> Self {
        ArmorError::Io { source: err, path: PathBuf::new() }
    }
}

impl From<walkdir::Error> for ArmorError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(Path::to_path_buf).unwrap_or_default();
        ArmorError::Io { source: err.into(), path }
    }
}

/// Attaches the offending path to an I/O result.
pub(crate) trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| ArmorError::Io { source, path: path.to_path_buf() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_context_records_path() {
        let res: io::Result<()> = Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = res.at(Path::new("_fs_data/etc")).unwrap_err();
        assert!(err.to_string().contains("_fs_data/etc"));
        match err {
            ArmorError::Io { source, .. } => assert_eq!(source.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
