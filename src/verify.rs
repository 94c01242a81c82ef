//! Read-only consistency check of an armored tree.
//!
//! Walks both subtrees and fails on the first violation: a data entry without
//! a record, a key that does not decode, a record stored under somebody
//! else's key, an on-disk kind that contradicts the record, or a regular file
//! whose length differs from the declared size. A tree that verifies joins
//! without surprises.

use std::fs::File;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::annotation::{self, TreePath};
use crate::error::{ArmorError, IoContext, Result};
use crate::record::EntryKind;
use crate::tree::{self, ArmoredTree};

#[derive(Debug, Default, Clone, Serialize)]
pub struct VerifyReport {
    pub data_entries: u64,
    pub records: u64,
    pub metadata_only: u64,
    pub payload_bytes: u64,
}

pub fn verify_tree(dir: &Path) -> Result<VerifyReport> {
    let tree = ArmoredTree::open(dir);
    let mut report = VerifyReport::default();

    for entry in WalkDir::new(tree.data_root()).min_depth(1).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let path = tree.data_entry_path(entry.path())?;
        let record = tree.read_record(&path)?;
        let kind = record.kind();
        tree::check_data_kind(&path, &record, entry.file_type())?;

        if kind == EntryKind::Regular {
            let declared = record.size()?;
            let actual = entry.metadata()?.len();
            if declared != actual {
                return Err(ArmorError::SizeMismatch { path: path.to_string(), declared, actual });
            }
            report.payload_bytes += actual;
        }
        debug!(path = %path, kind = kind.describe(), "data entry ok");
        report.data_entries += 1;
    }

    for entry in WalkDir::new(tree.meta_root()).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let key = tree.record_key(entry.path())?;
        let path = annotation::decode(&key)?;
        let file = File::open(entry.path()).at(entry.path())?;
        let record = tree::read_record_file(file, entry.path())?;

        if TreePath::normalize(record.name_bytes()) != path {
            return Err(ArmorError::KeyMismatch {
                key: String::from_utf8_lossy(&key).into_owned(),
                name: record.display_name().into_owned(),
            });
        }
        if matches!(record.kind(), EntryKind::Other(_)) {
            report.metadata_only += 1;
        }
        report.records += 1;
    }

    info!(
        data_entries = report.data_entries,
        records = report.records,
        "tree verified"
    );
    Ok(report)
}
