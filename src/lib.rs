//! # fsarmor Core Library
//!
//! This crate converts a tar stream into an "armored" directory tree and back.
//! The tree keeps payload bytes and metadata apart, so it can live in storage
//! or version-control systems that lose permissions, ownership, timestamps,
//! symlink targets and special-file types: the payload diffs and deduplicates
//! like any other file, while every header survives byte for byte in a small
//! record next to it.
//!
//! ## Key Modules
//!
//! - [`annotation`]: The self-checking storage key for a metadata record.
//! - [`record`]: Entry records and the archive writer used to re-emit them.
//! - [`tree`]: Layout of the armored tree (`_fs_data` / `_fs_meta`).
//! - [`symlink`]: Chooses the on-disk target for an archived symlink.
//! - [`split`] / [`join`]: The two conversion engines.
//! - [`verify`]: Read-only consistency check of a tree.
//!
//! ## Examples
//!
//! ```no_run
//! use std::fs::File;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let report = fsarmor::split(File::open("rootfs.tar")?, Path::new("armor"))?;
//! println!("{} entries split", report.entries);
//!
//! let (_out, _) = fsarmor::join(Path::new("armor"), File::create("rootfs-again.tar")?)?;
//! # Ok(())
//! # }
//! ```

pub mod annotation;
pub mod cli;
pub mod cli_runner;
pub mod error;
pub use error::{ArmorError, Result};

pub mod record;
pub mod symlink;
pub mod tree;

pub mod join;
pub mod split;
pub mod verify;

pub use join::join;
pub use split::split;
pub use verify::verify_tree;

// Cross-platform filesystem wrapper
pub mod fsx;
