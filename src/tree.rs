//! # Armored Tree Layout
//!
//! An armored tree is a directory holding exactly two subtrees:
//!
//! - `_fs_data/` mirrors the archive's path hierarchy and holds raw payload
//!   bytes at each regular-file path (plus directories and symlinks).
//! - `_fs_meta/` holds one serialized [`EntryRecord`] per archive entry, at
//!   the entry's annotation (see [`crate::annotation`]).

use std::fs::{File, FileType};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use crate::annotation::{self, TreePath};
use crate::error::{ArmorError, IoContext, Result};
use crate::fsx as fs;
use crate::record::{EntryKind, EntryRecord};

/// Name of the payload subtree.
pub const DATA_TREE: &str = "_fs_data";
/// Name of the metadata subtree.
pub const META_TREE: &str = "_fs_meta";

#[derive(Debug, Clone)]
pub struct ArmoredTree {
    root: PathBuf,
}

impl ArmoredTree {
    /// Opens an existing tree. Nothing is checked or created.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        ArmoredTree { root: root.into() }
    }

    /// Opens the tree at `root`, creating it and both subtrees if absent.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let tree = Self::open(root);
        fs::create_dir_all(tree.data_root()).at(&tree.data_root())?;
        fs::create_dir_all(tree.meta_root()).at(&tree.meta_root())?;
        Ok(tree)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_root(&self) -> PathBuf {
        self.root.join(DATA_TREE)
    }

    pub fn meta_root(&self) -> PathBuf {
        self.root.join(META_TREE)
    }

    /// Location of the metadata record for `path`.
    pub fn record_path(&self, path: &TreePath) -> Result<PathBuf> {
        let key = annotation::encode_tree_path(path);
        let key = fs::os_str_from_bytes(&key).ok_or_else(|| unrepresentable(path))?;
        Ok(self.meta_root().join(key))
    }

    /// Location of the payload for `path`. A `TreePath` never holds `..`, so
    /// the result always lies inside the data root.
    pub fn data_path(&self, path: &TreePath) -> Result<PathBuf> {
        let mut out = self.data_root();
        for comp in path.components() {
            out.push(fs::os_str_from_bytes(comp).ok_or_else(|| unrepresentable(path))?);
        }
        Ok(out)
    }

    /// Refuses to write below `path` when one of its ancestors inside the data
    /// root is a symlink: following it could place bytes outside the tree.
    pub fn check_ancestors(&self, path: &TreePath) -> Result<()> {
        let mut current = self.data_root();
        let components: Vec<&[u8]> = path.components().collect();
        for comp in components.iter().take(components.len().saturating_sub(1)) {
            current.push(fs::os_str_from_bytes(comp).ok_or_else(|| unrepresentable(path))?);
            match fs::symlink_metadata(&current) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(ArmorError::UnsafeEntryName {
                        name: path.to_string(),
                        reason: "an ancestor directory is a symlink",
                    });
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => return Err(e).at(&current),
            }
        }
        Ok(())
    }

    /// Maps a path found while walking the data subtree back to its entry path.
    pub fn data_entry_path(&self, found: &Path) -> Result<TreePath> {
        relative_tree_path(&self.data_root(), found)
    }

    /// Maps a file found while walking the metadata subtree back to its key.
    pub fn record_key(&self, found: &Path) -> Result<Vec<u8>> {
        Ok(relative_tree_path(&self.meta_root(), found)?.as_bytes().to_vec())
    }

    /// Stores `record` at the annotation of `path`, replacing any earlier one.
    pub fn write_record(&self, path: &TreePath, record: &EntryRecord) -> Result<PathBuf> {
        let target = self.record_path(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }
        let file = File::create(&target).at(&target)?;
        let mut writer = BufWriter::new(file);
        record.write_to(&mut writer).at(&target)?;
        writer.flush().at(&target)?;
        Ok(target)
    }

    /// Loads the record for `path`; a missing record is [`ArmorError::MissingMetadata`].
    pub fn read_record(&self, path: &TreePath) -> Result<EntryRecord> {
        let record = self.record_path(path)?;
        match File::open(&record) {
            Ok(file) => read_record_file(file, &record),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ArmorError::MissingMetadata {
                path: path.to_string(),
                record,
            }),
            Err(e) => Err(e).at(&record),
        }
    }

    pub fn has_record(&self, path: &TreePath) -> bool {
        self.record_path(path).map_or(false, |p| p.is_file())
    }
}

/// Fails with [`ArmorError::TypeMismatch`] unless a data entry of type
/// `file_type` can hold the entry `record` describes.
pub fn check_data_kind(path: &TreePath, record: &EntryRecord, file_type: FileType) -> Result<()> {
    let kind = record.kind();
    let consistent = match kind {
        EntryKind::Directory => file_type.is_dir(),
        EntryKind::Symlink => file_type.is_symlink(),
        EntryKind::Regular => file_type.is_file(),
        EntryKind::Other(_) => false,
    };
    if consistent {
        return Ok(());
    }
    let on_disk = if file_type.is_dir() {
        "directory"
    } else if file_type.is_symlink() {
        "symlink"
    } else {
        "regular file"
    };
    Err(ArmorError::TypeMismatch { path: path.to_string(), on_disk, recorded: kind.describe() })
}

fn unrepresentable(path: &TreePath) -> ArmorError {
    ArmorError::UnsafeEntryName {
        name: path.to_string(),
        reason: "name cannot be represented as a path on this platform",
    }
}

/// Parses a stored metadata file.
pub(crate) fn read_record_file(file: File, path: &Path) -> Result<EntryRecord> {
    EntryRecord::read_from(io::BufReader::new(file))
        .at(path)?
        .ok_or_else(|| ArmorError::EmptyRecord { record: path.to_path_buf() })
}

fn relative_tree_path(base: &Path, found: &Path) -> Result<TreePath> {
    let rel = found.strip_prefix(base).map_err(|_| ArmorError::UnsafeEntryName {
        name: found.display().to_string(),
        reason: "path lies outside the armored tree",
    })?;
    let mut parts = Vec::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(name) => parts.push(fs::os_str_bytes(name).ok_or_else(|| ArmorError::UnsafeEntryName {
                name: found.display().to_string(),
                reason: "path is not valid UTF-8",
            })?),
            _ => {
                return Err(ArmorError::UnsafeEntryName {
                    name: found.display().to_string(),
                    reason: "unexpected path component",
                })
            }
        }
    }
    Ok(TreePath::normalize(parts.join(&b'/')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record_named(name: &str) -> EntryRecord {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(4);
        let mut builder = tar::Builder::new(Vec::new());
        builder.append_data(&mut header, name, &b"data"[..]).unwrap();
        let bytes = builder.into_inner().unwrap();
        EntryRecord::read_from(bytes.as_slice()).unwrap().unwrap()
    }

    #[test]
    fn layout_paths() {
        let tree = ArmoredTree::open("/srv/armor");
        let p = TreePath::normalize("etc/resolv.conf");
        assert_eq!(tree.record_path(&p).unwrap(), Path::new("/srv/armor/_fs_meta/2/etc/resolv.conf"));
        assert_eq!(tree.data_path(&p).unwrap(), Path::new("/srv/armor/_fs_data/etc/resolv.conf"));
        assert_eq!(tree.record_path(&TreePath::root()).unwrap(), Path::new("/srv/armor/_fs_meta/0"));
        assert_eq!(tree.data_path(&TreePath::root()).unwrap(), Path::new("/srv/armor/_fs_data"));
    }

    #[test]
    fn record_write_then_read() {
        let dir = tempdir().unwrap();
        let tree = ArmoredTree::create(dir.path()).unwrap();
        let p = TreePath::normalize("etc/hosts");
        tree.write_record(&p, &record_named("etc/hosts")).unwrap();
        assert!(tree.has_record(&p));

        let back = tree.read_record(&p).unwrap();
        assert_eq!(back.name(), Some("etc/hosts"));
        assert_eq!(back.size().unwrap(), 4);
    }

    #[test]
    fn missing_record_is_reported() {
        let dir = tempdir().unwrap();
        let tree = ArmoredTree::create(dir.path()).unwrap();
        let err = tree.read_record(&TreePath::normalize("nope")).unwrap_err();
        assert!(matches!(err, ArmorError::MissingMetadata { .. }));
    }

    #[test]
    fn empty_record_is_reported() {
        let dir = tempdir().unwrap();
        let tree = ArmoredTree::create(dir.path()).unwrap();
        let p = TreePath::normalize("x");
        let record = tree.record_path(&p).unwrap();
        fs::create_dir_all(record.parent().unwrap()).unwrap();
        fs::write(&record, b"").unwrap();
        assert!(matches!(tree.read_record(&p), Err(ArmorError::EmptyRecord { .. })));
    }

    #[test]
    fn walked_paths_map_back() {
        let tree = ArmoredTree::open("/t");
        assert_eq!(tree.data_entry_path(Path::new("/t/_fs_data/a/b")).unwrap().as_bytes(), b"a/b");
        assert!(tree.data_entry_path(Path::new("/t/_fs_data")).unwrap().is_root());
        assert_eq!(tree.record_key(Path::new("/t/_fs_meta/2/a/b")).unwrap(), b"2/a/b");
        assert!(tree.data_entry_path(Path::new("/elsewhere/a")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn latin1_paths_map_both_ways() {
        let tree = ArmoredTree::open("/t");
        let p = TreePath::normalize(b"srv/caf\xe9.txt");
        let data = tree.data_path(&p).unwrap();
        assert_eq!(tree.data_entry_path(&data).unwrap(), p);
        let record = tree.record_path(&p).unwrap();
        assert_eq!(tree.record_key(&record).unwrap(), b"2/srv/caf\xe9.txt");
    }

    #[test]
    fn data_kind_must_match_record() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f"), b"data").unwrap();
        let p = TreePath::normalize("etc/hosts");
        let record = record_named("etc/hosts");

        let file_type = fs::symlink_metadata(dir.path().join("f")).unwrap().file_type();
        check_data_kind(&p, &record, file_type).unwrap();
        let dir_type = fs::symlink_metadata(dir.path()).unwrap().file_type();
        let err = check_data_kind(&p, &record, dir_type).unwrap_err();
        assert!(matches!(err, ArmorError::TypeMismatch { on_disk: "directory", recorded: "regular file", .. }));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_ancestor_is_refused() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let tree = ArmoredTree::create(dir.path()).unwrap();
        fs::symlink(outside.path(), &tree.data_root().join("lib")).unwrap();

        let err = tree.check_ancestors(&TreePath::normalize("lib/evil.so")).unwrap_err();
        assert!(matches!(err, ArmorError::UnsafeEntryName { .. }));
        tree.check_ancestors(&TreePath::normalize("lib")).unwrap();
        tree.check_ancestors(&TreePath::normalize("usr/lib/x")).unwrap();
    }
}
