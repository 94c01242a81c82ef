//! Cross-platform filesystem helpers.
//!
//! Symlinks are created with an explicit link path: the target string is
//! stored verbatim and the OS resolves it relative to the link's own
//! directory, so no working-directory switch is ever needed.
//!
//! Archive names are bytes. On Unix they map onto paths unchanged; elsewhere
//! only UTF-8 names have a path.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

pub use std::fs::*;

#[cfg(unix)]
/// Creates a symlink at `link` whose stored target is `target`.
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
/// Creates a symlink at `link` whose stored target is `target`.
/// Windows needs to know the kind up front; archive links mostly name files.
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    let resolved = link.parent().map(|p| p.join(target));
    match resolved {
        Some(p) if p.is_dir() => std::os::windows::fs::symlink_dir(target, link),
        _ => std::os::windows::fs::symlink_file(target, link),
    }
}

#[cfg(unix)]
pub fn os_str_from_bytes(bytes: &[u8]) -> Option<&OsStr> {
    use std::os::unix::ffi::OsStrExt;
    Some(OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
pub fn os_str_from_bytes(bytes: &[u8]) -> Option<&OsStr> {
    std::str::from_utf8(bytes).ok().map(OsStr::new)
}

#[cfg(unix)]
pub fn os_str_bytes(name: &OsStr) -> Option<&[u8]> {
    use std::os::unix::ffi::OsStrExt;
    Some(name.as_bytes())
}

#[cfg(not(unix))]
pub fn os_str_bytes(name: &OsStr) -> Option<&[u8]> {
    name.to_str().map(str::as_bytes)
}

/// The path spelled by `bytes`, if this platform can represent it.
pub fn path_from_bytes(bytes: &[u8]) -> Option<PathBuf> {
    os_str_from_bytes(bytes).map(PathBuf::from)
}

/// Removes whatever non-directory sits at `path` (file or symlink, dangling
/// or not) so a later archive entry can take its place. Directories are left
/// alone and a missing path is not an error.
pub fn remove_existing(path: &Path) -> io::Result<()> {
    match symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
