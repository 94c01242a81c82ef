//! # Split Engine
//!
//! Reads an archive stream and populates an [`ArmoredTree`]: every entry's
//! record goes to the metadata subtree, regular files, directories and
//! symlinks are materialized in the data subtree.
//!
//! There is no rollback. The first I/O error aborts the split and leaves the
//! tree as far as it got; callers that care should split into a fresh
//! directory.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::annotation::{self, TreePath};
use crate::error::{ArmorError, IoContext, Result};
use crate::fsx as fs;
use crate::record::{EntryKind, EntryRecord};
use crate::symlink::{self, Ambiguity};
use crate::tree::ArmoredTree;

/// A symlink whose materialized target may not match the archive's intent.
#[derive(Debug, Clone, Serialize)]
pub struct AmbiguousLink {
    pub name: String,
    pub target: String,
    pub reason: Ambiguity,
}

/// What a split did, including everything that was recorded but not
/// materialized in the data subtree.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SplitReport {
    pub entries: u64,
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub payload_bytes: u64,
    /// Entries stored as metadata only (devices, fifos, hard links, ...).
    pub unsupported: Vec<String>,
    pub ambiguous_symlinks: Vec<AmbiguousLink>,
    /// Names whose `..` components climbed above the root and were clamped.
    pub neutralized: Vec<String>,
}

/// Splits the archive read from `src` into the armored tree at `dir`,
/// creating the tree if needed.
pub fn split<R: Read>(src: R, dir: &Path) -> Result<SplitReport> {
    let tree = ArmoredTree::create(dir)?;
    let mut report = SplitReport::default();
    let mut archive = tar::Archive::new(src);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let record = EntryRecord::from_entry(&mut entry)?;
        let display = record.display_name().into_owned();
        let name = display.as_str();
        let path = TreePath::normalize(record.name_bytes());
        debug!(name, kind = record.kind().describe(), "archive entry");

        if annotation::escapes_root(record.name_bytes()) {
            warn!(name, stored_as = %path, "entry name climbs above the root; clamped");
            report.neutralized.push(display.clone());
        }

        let stored = tree.write_record(&path, &record)?;
        trace!(name, record = %stored.display(), "stored header");
        report.entries += 1;

        match record.kind() {
            EntryKind::Regular => {
                let size = record.size()?;
                let target = payload_target(&tree, &path, name)?;
                copy_payload(&mut entry, &target, size)?;
                debug!(name, size, "stored payload");
                report.files += 1;
                report.payload_bytes += size;
            }
            EntryKind::Directory => {
                let target = tree.data_path(&path)?;
                tree.check_ancestors(&path)?;
                if !path.is_root() {
                    fs::remove_existing(&target).at(&target)?;
                }
                fs::create_dir_all(&target).at(&target)?;
                report.directories += 1;
            }
            EntryKind::Symlink => {
                let stored_target = record.link_target_bytes().unwrap_or_default();
                let shown_target = String::from_utf8_lossy(stored_target);
                let target = payload_target(&tree, &path, name)?;
                let plan = symlink::reconcile(&path, stored_target);
                if let Some(reason) = plan.ambiguity {
                    warn!(name, target = %shown_target, ?reason, "symlink target is ambiguous; using best effort");
                    report.ambiguous_symlinks.push(AmbiguousLink {
                        name: display.clone(),
                        target: shown_target.to_string(),
                        reason,
                    });
                }
                let on_disk = fs::path_from_bytes(&plan.target).ok_or_else(|| ArmorError::UnsafeEntryName {
                    name: display.clone(),
                    reason: "symlink target cannot be represented as a path on this platform",
                })?;
                fs::symlink(&on_disk, &target).at(&target)?;
                debug!(name, stored = %shown_target, on_disk = %on_disk.display(), local = plan.local, "created symlink");
                report.symlinks += 1;
            }
            EntryKind::Other(tag) => {
                // Whatever an earlier entry of this name left behind no longer has a record.
                if !path.is_root() {
                    tree.check_ancestors(&path)?;
                    let stale = tree.data_path(&path)?;
                    fs::remove_existing(&stale).at(&stale)?;
                }
                warn!(name, tag = %char::from(tag), "payload of this entry type is not stored; metadata only");
                report.unsupported.push(display.clone());
            }
        }
    }

    info!(
        entries = report.entries,
        files = report.files,
        bytes = report.payload_bytes,
        unsupported = report.unsupported.len(),
        "split complete"
    );
    Ok(report)
}

/// Prepares the data-subtree location for a file or symlink entry: checks
/// ancestors, creates parent directories and clears anything that an earlier
/// entry left at the same path.
fn payload_target(tree: &ArmoredTree, path: &TreePath, name: &str) -> Result<PathBuf> {
    if path.is_root() {
        return Err(ArmorError::UnsafeEntryName {
            name: name.to_string(),
            reason: "only a directory may name the root",
        });
    }
    tree.check_ancestors(path)?;
    let target = tree.data_path(path)?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }
    fs::remove_existing(&target).at(&target)?;
    Ok(target)
}

/// Copies exactly `size` bytes of the current entry; never reads past it.
fn copy_payload<R: Read>(entry: &mut R, target: &Path, size: u64) -> Result<()> {
    let file = File::create(target).at(target)?;
    let mut writer = BufWriter::new(file);
    let copied = io::copy(&mut entry.take(size), &mut writer).at(target)?;
    if copied != size {
        return Err(ArmorError::Io {
            source: io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("archive ended after {copied} of {size} payload bytes"),
            ),
            path: target.to_path_buf(),
        });
    }
    writer.flush().at(target)?;
    Ok(())
}
