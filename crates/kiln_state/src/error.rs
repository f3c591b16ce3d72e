//! Error types for build state persistence.

use std::path::PathBuf;

/// Errors that can occur while persisting build state.
///
/// Loading is fail-safe and never returns these: unreadable or corrupt
/// state files read back as missing, which costs a full rebuild. Saving
/// reports failures so the engine can warn that the next build will not
/// be incremental.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// An I/O error occurred while reading or writing state files.
    #[error("state I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}
