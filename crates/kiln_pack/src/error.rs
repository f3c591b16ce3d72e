//! Error types for platform packaging.

use std::path::PathBuf;

/// Errors that can occur while producing a platform package.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// No packager is registered for the platform identifier.
    #[error("unknown packaging platform '{0}'")]
    UnknownPlatform(String),

    /// The program image to package does not exist.
    #[error("program image missing at {0}")]
    MissingImage(PathBuf),

    /// An I/O error occurred while writing the package.
    #[error("packaging I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The package manifest could not be encoded.
    #[error("failed to encode package manifest: {reason}")]
    Manifest {
        /// Description of the encoding failure.
        reason: String,
    },
}
