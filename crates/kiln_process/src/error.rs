//! Error types for external process execution.

/// Errors that can occur while running an external toolchain process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The process could not be spawned.
    #[error("failed to launch '{command}': {source}")]
    Spawn {
        /// The command that failed to launch.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Waiting for the process to exit failed.
    #[error("failed waiting for '{command}': {source}")]
    Wait {
        /// The command being waited on.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
