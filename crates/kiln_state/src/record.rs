//! The persisted record of what a variant's last build saw and produced.

use crate::snapshot::FileSnapshot;
use kiln_common::{BuildVariant, ContentHash};
use kiln_deps::DependencyGraph;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Outcome summary of one build of one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    /// The variant that was built.
    pub variant: BuildVariant,
    /// Seconds since the Unix epoch when the build finished.
    pub timestamp: u64,
    /// Whether the build completed with no errors.
    pub success: bool,
    /// The produced artifact, when one was produced.
    pub artifact: Option<PathBuf>,
    /// Number of error diagnostics emitted.
    pub error_count: usize,
}

impl BuildResult {
    /// Creates a result stamped with the current time.
    pub fn now(
        variant: BuildVariant,
        success: bool,
        artifact: Option<PathBuf>,
        error_count: usize,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            variant,
            timestamp,
            success,
            artifact,
            error_count,
        }
    }
}

/// Everything the engine remembers about one variant between builds.
///
/// A state that is not `valid` makes no incremental claims: the next build
/// treats the whole tree as changed. `full_rebuild_needed` carries a failed
/// or canceled build forward so the next build is unconditionally full even
/// though the record itself is intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildState {
    /// The variant this state describes.
    pub variant: BuildVariant,
    /// The most recent build result, if any build has run.
    pub last_result: Option<BuildResult>,
    /// Content hashes of the tracked tree as of the last successful build.
    pub snapshot: FileSnapshot,
    /// Per-file dependency edges recorded during the last build.
    pub dependencies: DependencyGraph<PathBuf>,
    /// Fingerprint of the build-affecting configuration last built against.
    pub config_fingerprint: Option<ContentHash>,
    /// Whether the snapshot and graph can be trusted for incremental decisions.
    pub valid: bool,
    /// Whether the next build must rebuild everything regardless of the diff.
    pub full_rebuild_needed: bool,
}

impl BuildState {
    /// Creates the state of a variant that has never been built.
    pub fn new(variant: BuildVariant) -> Self {
        Self {
            variant,
            last_result: None,
            snapshot: FileSnapshot::empty(),
            dependencies: DependencyGraph::new(),
            config_fingerprint: None,
            valid: false,
            full_rebuild_needed: false,
        }
    }

    /// Marks the state untrustworthy and drops the dependency edges, which
    /// describe compilations that no longer stand.
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.dependencies.clear();
    }

    /// Returns `true` if the next build must treat every file as changed.
    pub fn needs_full_rebuild(&self) -> bool {
        !self.valid || self.full_rebuild_needed
    }
}
