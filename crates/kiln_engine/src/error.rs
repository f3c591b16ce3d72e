//! Error types for the build pipeline.

use kiln_config::ConfigError;
use kiln_pack::PackError;
use kiln_process::ProcessError;
use kiln_state::StateError;
use std::path::PathBuf;

/// Errors raised while preparing or running a build.
///
/// Configuration problems (`InvalidSession`, `Config`, unknown packaging
/// platforms) surface before any external tool runs. Everything else is
/// raised mid-pipeline and is converted into a failed [`BuildResult`]
/// rather than escaping to the caller, so the finalize step always runs.
///
/// [`BuildResult`]: kiln_state::BuildResult
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The requested stage flags form an illegal combination.
    #[error("invalid build session: {reason}")]
    InvalidSession {
        /// Which rule the combination violates.
        reason: String,
    },

    /// The project configuration is missing or inconsistent.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An external tool process could not be launched or awaited.
    #[error("external process error: {0}")]
    Process(#[from] ProcessError),

    /// An external tool exited abnormally without reporting diagnostics.
    #[error("external tool '{tool}' failed: {detail}")]
    ToolFailed {
        /// The command that failed.
        tool: String,
        /// Exit status or stream condition observed.
        detail: String,
    },

    /// The platform packager reported a failure.
    #[error("packaging error: {0}")]
    Pack(#[from] PackError),

    /// The packager reported success but its artifact does not exist.
    #[error("packager reported success but no artifact exists at {path}")]
    ArtifactMissing {
        /// The path the packager claimed to have written.
        path: PathBuf,
    },

    /// Build state could not be persisted or discarded.
    #[error("build state error: {0}")]
    State(#[from] StateError),

    /// An I/O error occurred while managing build outputs.
    #[error("build I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
