//! # Path Annotation Codec
//!
//! Turns an archive entry name into the key under which its metadata record is
//! stored: `"{depth}/{normalized path}"`, or `"0"` for the root.
//!
//! The depth prefix is redundant (the rest of the key already names the path)
//! but it is checked on decode, so a truncated or hand-edited key is rejected
//! instead of silently pointing at another record. It also keeps records of
//! different depths in disjoint directories, so a record file such as
//! `1/etc` never collides with the directory `2/etc/` holding its children.

use std::fmt;

use crate::error::{ArmorError, Result};

/// The annotation of the root path.
pub const ROOT_ANNOTATION: &[u8] = b"0";

const PARENT: &[u8] = b"..";

/// A lexically normalized, relative, `/`-separated path.
///
/// `.` and empty components are dropped and `..` is resolved against a virtual
/// root, so a `TreePath` never contains `..` and never escapes the tree it is
/// joined onto. The root is the empty path. Components are raw bytes: archive
/// names need not be UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TreePath(Vec<u8>);

impl TreePath {
    /// The root path (depth 0, no components).
    pub fn root() -> Self {
        TreePath(Vec::new())
    }

    /// Normalizes `path`: resolves `.`/`..`, collapses repeated separators
    /// and strips any leading separator. `""`, `"."` and `"/"` give the root.
    pub fn normalize(path: impl AsRef<[u8]>) -> Self {
        let mut parts: Vec<&[u8]> = Vec::new();
        for comp in path.as_ref().split(|&b| b == b'/') {
            match comp {
                b"" | b"." => {}
                b".." => {
                    parts.pop();
                }
                c => parts.push(c),
            }
        }
        TreePath(parts.join(&b'/'))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn components(&self) -> impl Iterator<Item = &[u8]> {
        self.0.split(|&b| b == b'/').filter(|c| !c.is_empty())
    }

    /// Number of components; 0 for the root.
    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// The containing directory; the root is its own parent.
    pub fn parent(&self) -> TreePath {
        match self.0.iter().rposition(|&b| b == b'/') {
            Some(idx) => TreePath(self.0[..idx].to_vec()),
            None => TreePath::root(),
        }
    }

    /// Last component, `None` for the root.
    pub fn file_name(&self) -> Option<&[u8]> {
        self.components().last()
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&String::from_utf8_lossy(&self.0))
        }
    }
}

/// Reports whether `path` climbs above its root with `..`, i.e. whether
/// [`TreePath::normalize`] had to drop a parent reference to keep it inside.
pub fn escapes_root(path: impl AsRef<[u8]>) -> bool {
    let mut depth = 0usize;
    for comp in path.as_ref().split(|&b| b == b'/') {
        match comp {
            b"" | b"." => {}
            c if c == PARENT => {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            _ => depth += 1,
        }
    }
    false
}

/// Encodes `path` into its self-checking storage key.
pub fn encode(path: impl AsRef<[u8]>) -> Vec<u8> {
    encode_tree_path(&TreePath::normalize(path))
}

/// Encodes an already normalized path.
pub fn encode_tree_path(path: &TreePath) -> Vec<u8> {
    if path.is_root() {
        return ROOT_ANNOTATION.to_vec();
    }
    let mut key = path.depth().to_string().into_bytes();
    key.push(b'/');
    key.extend_from_slice(path.as_bytes());
    key
}

/// Decodes a storage key back into the normalized path it was built from.
///
/// Fails with [`ArmorError::MalformedAnnotation`] when the leading token is not
/// a non-negative integer, or when it does not match the number of path
/// components that follow it.
pub fn decode(annotation: impl AsRef<[u8]>) -> Result<TreePath> {
    let raw = annotation.as_ref();
    let malformed = |reason| ArmorError::MalformedAnnotation {
        annotation: String::from_utf8_lossy(raw).into_owned(),
        reason,
    };

    let normalized = TreePath::normalize(raw);
    let bytes = normalized.as_bytes();
    let (token, rest) = match bytes.iter().position(|&b| b == b'/') {
        Some(idx) => (&bytes[..idx], &bytes[idx + 1..]),
        None => (bytes, &b""[..]),
    };

    if token.is_empty() || !token.iter().all(|b| b.is_ascii_digit()) {
        return Err(malformed("depth is not a non-negative integer"));
    }
    let depth: usize = std::str::from_utf8(token)
        .ok()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| malformed("depth is out of range"))?;

    let path = TreePath::normalize(rest);
    if depth == 0 {
        if !path.is_root() {
            return Err(malformed("root annotation has trailing components"));
        }
        return Ok(TreePath::root());
    }
    if path.depth() != depth {
        return Err(malformed("depth does not match the number of components"));
    }
    Ok(path)
}
