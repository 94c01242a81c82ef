//! # Join Engine
//!
//! Re-emits an archive stream from an [`ArmoredTree`].
//!
//! The data subtree is walked in lexicographic order, so output is
//! reproducible but does not follow the original stream's entry order. Every
//! visited path must have a metadata record; there is no fallback header.
//! Entries that only ever existed as metadata (devices, fifos, hard links)
//! are emitted last, in key order.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::annotation::{self, TreePath};
use crate::error::{ArmorError, IoContext, Result};
use crate::record::{ArchiveWriter, EntryKind, EntryRecord};
use crate::tree::{self, ArmoredTree};

#[derive(Debug, Default, Clone, Serialize)]
pub struct JoinReport {
    pub entries: u64,
    pub payload_bytes: u64,
    /// Metadata-only entries emitted after the data walk.
    pub metadata_only: u64,
    /// Metadata-only records left out because their payload was never stored.
    pub skipped: Vec<String>,
}

/// Writes the archive reconstructed from the tree at `dir` to `dst` and
/// returns `dst`. On error nothing more is written, not even the trailer.
pub fn join<W: Write>(dir: &Path, dst: W) -> Result<(W, JoinReport)> {
    let tree = ArmoredTree::open(dir);
    let mut out = ArchiveWriter::new(dst);
    let mut report = JoinReport::default();

    let data_root = tree.data_root();
    if !data_root.is_dir() {
        return Err(ArmorError::Io {
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "data subtree is missing"),
            path: data_root,
        });
    }

    // The data root only has a record when the stream named it (e.g. `./`).
    if tree.has_record(&TreePath::root()) {
        let record = tree.read_record(&TreePath::root())?;
        out.append_record(&record)?;
        report.entries += 1;
    }

    let walker = WalkDir::new(&data_root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry?;
        let path = tree.data_entry_path(entry.path())?;
        let record = tree.read_record(&path)?;
        tree::check_data_kind(&path, &record, entry.file_type())?;
        debug!(path = %path, name = %record.display_name(), "emitting entry");
        out.append_record(&record).at(entry.path())?;
        report.entries += 1;

        if record.kind() != EntryKind::Regular {
            continue;
        }
        let size = record.size()?;
        if size == 0 {
            continue;
        }
        let file = File::open(entry.path()).at(entry.path())?;
        out.append_payload(BufReader::new(file), size).at(entry.path())?;
        debug!(path = %path, size, "wrote payload");
        report.payload_bytes += size;
    }

    let meta_root = tree.meta_root();
    for entry in WalkDir::new(&meta_root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let key = tree.record_key(entry.path())?;
        let path = annotation::decode(&key)?;
        let file = File::open(entry.path()).at(entry.path())?;
        let record = tree::read_record_file(file, entry.path())?;
        if !matches!(record.kind(), EntryKind::Other(_)) || path.is_root() {
            continue;
        }
        if std::fs::symlink_metadata(tree.data_path(&path)?).is_ok() {
            continue;
        }
        if record.size()? != 0 {
            warn!(name = %record.display_name(), "metadata-only entry declares a payload that was never stored; skipped");
            report.skipped.push(record.display_name().into_owned());
            continue;
        }
        emit_metadata_only(&mut out, &record)?;
        report.entries += 1;
        report.metadata_only += 1;
    }

    let dst = out.finish()?;
    info!(entries = report.entries, bytes = report.payload_bytes, "join complete");
    Ok((dst, report))
}

fn emit_metadata_only<W: Write>(out: &mut ArchiveWriter<W>, record: &EntryRecord) -> Result<()> {
    debug!(name = %record.display_name(), "emitting metadata-only entry");
    out.append_record(record)?;
    Ok(())
}
