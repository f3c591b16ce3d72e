//! Tree diffing and the incremental-versus-full decision.

use crate::record::BuildState;
use crate::snapshot::FileSnapshot;
use kiln_common::ContentHash;
use std::path::PathBuf;

/// The difference between two file tree snapshots.
///
/// All three lists are sorted. An empty diff does not by itself mean no
/// work: link and package decisions consult more than the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDiff {
    /// Files present now but not in the previous snapshot.
    pub added: Vec<PathBuf>,
    /// Files whose content hash differs from the previous snapshot.
    pub changed: Vec<PathBuf>,
    /// Files in the previous snapshot but gone now.
    pub removed: Vec<PathBuf>,
}

impl TreeDiff {
    /// Returns `true` if nothing was added, changed, or removed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Returns the number of files needing reprocessing (added + changed).
    pub fn dirty_count(&self) -> usize {
        self.added.len() + self.changed.len()
    }

    /// Returns every path the diff mentions, for dependency propagation.
    pub fn touched(&self) -> Vec<PathBuf> {
        let mut all = Vec::with_capacity(self.added.len() + self.changed.len() + self.removed.len());
        all.extend(self.added.iter().cloned());
        all.extend(self.changed.iter().cloned());
        all.extend(self.removed.iter().cloned());
        all.sort();
        all
    }
}

/// Compares two snapshots, categorizing every path as added, changed,
/// removed, or unchanged.
pub fn diff_trees(old: &FileSnapshot, new: &FileSnapshot) -> TreeDiff {
    let mut added = Vec::new();
    let mut changed = Vec::new();

    for (path, hash) in new.files() {
        match old.get(path) {
            Some(old_hash) if old_hash == hash => {}
            Some(_) => changed.push(path.clone()),
            None => added.push(path.clone()),
        }
    }

    let removed: Vec<PathBuf> = old
        .paths()
        .filter(|path| new.get(path).is_none())
        .cloned()
        .collect();

    // Snapshot iteration is already path-ordered
    TreeDiff {
        added,
        changed,
        removed,
    }
}

/// Decides between an incremental diff and a full rebuild.
///
/// Returns `None` when no incremental claim can be made: a clean was
/// requested, the stored state is untrusted or carries a forced-rebuild
/// flag, or the configuration fingerprint no longer matches. `None` means
/// every current file is treated as changed. Otherwise returns the diff
/// of the stored snapshot against `current`, which may be empty.
pub fn compute_diff(
    state: &BuildState,
    current: &FileSnapshot,
    current_fingerprint: &ContentHash,
    clean_requested: bool,
) -> Option<TreeDiff> {
    if clean_requested || state.needs_full_rebuild() {
        return None;
    }
    if state.config_fingerprint != Some(*current_fingerprint) {
        return None;
    }
    Some(diff_trees(&state.snapshot, current))
}
