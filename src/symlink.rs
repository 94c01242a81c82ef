//! # Symlink Reconciler
//!
//! An archive stores a symlink target as an opaque string whose intended base
//! is unknown: it may be relative to the link, or rooted in the archive's own
//! namespace. On disk a link always resolves relative to its own directory.
//!
//! The heuristic recognizes one case: a target that, joined onto the link's
//! directory, lands back in that same directory is a *local* link and is
//! materialized as the bare file name, so it keeps pointing at the sibling
//! wherever the tree is moved. Every other target is materialized as written,
//! prefixed with `./`, which keeps any `../` traversal it encodes. Rooted
//! targets therefore resolve under the link's directory rather than the tree
//! root; that limitation is kept as is and reported as ambiguous.

use serde::Serialize;

use crate::annotation::TreePath;

/// Why the materialized link may not mean what the archive meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ambiguity {
    /// The stored target is rooted (`/...`); its base cannot be recovered.
    Absolute,
    /// The stored target climbs above the tree root.
    EscapesRoot,
    /// The stored target is empty.
    Empty,
}

/// The on-disk link to create for one symlink entry. `target` is raw bytes,
/// like the stored target it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPlan {
    pub target: Vec<u8>,
    pub local: bool,
    pub ambiguity: Option<Ambiguity>,
}

const PARENT: &[u8] = b"..";

/// Joins `rel` onto `base` and cleans the result lexically. Unlike
/// [`TreePath::normalize`], `..` that climbs past the start is kept.
fn lexical_join<'a>(base: &'a TreePath, rel: &'a [u8]) -> Vec<&'a [u8]> {
    let mut parts: Vec<&[u8]> = base.components().collect();
    for comp in rel.split(|&b| b == b'/') {
        match comp {
            b"" | b"." => {}
            c if c == PARENT => {
                if parts.last().map_or(false, |p| *p != PARENT) {
                    parts.pop();
                } else {
                    parts.push(PARENT);
                }
            }
            c => parts.push(c),
        }
    }
    parts
}

/// Computes the link to materialize at `link` (a normalized entry path) for
/// the stored target `target`.
pub fn reconcile(link: &TreePath, target: &[u8]) -> LinkPlan {
    let link_dir = link.parent();
    let resolved = lexical_join(&link_dir, target);

    let ambiguity = if target.is_empty() {
        Some(Ambiguity::Empty)
    } else if target.starts_with(b"/") {
        Some(Ambiguity::Absolute)
    } else if resolved.first() == Some(&PARENT) {
        Some(Ambiguity::EscapesRoot)
    } else {
        None
    };

    let resolved_dir = &resolved[..resolved.len().saturating_sub(1)];
    let local = !link_dir.is_root()
        && !resolved.is_empty()
        && resolved_dir.iter().copied().eq(link_dir.components());

    let on_disk = match resolved.last() {
        Some(name) if local => name.to_vec(),
        _ => {
            let rooted = target.iter().take_while(|&&b| b == b'/').count();
            let mut rebased = b"./".to_vec();
            rebased.extend_from_slice(&target[rooted..]);
            rebased
        }
    };

    LinkPlan { target: on_disk, local, ambiguity }
}
