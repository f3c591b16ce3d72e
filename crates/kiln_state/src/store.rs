//! On-disk persistence of per-variant build state.
//!
//! Each variant's state lives at `.kiln/state/<variant-key>/state.bin`
//! inside the project directory, framed with magic bytes, a format
//! version, and a payload checksum. Loading is fail-safe: any corruption,
//! truncation, or version skew reads back as missing state. Saves go
//! through a temporary file and rename so a crash mid-save leaves either
//! the old state or none, never a half-written record claiming validity.

use std::path::{Path, PathBuf};

use kiln_common::{BuildVariant, ContentHash};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::record::BuildState;

/// Directory under the project root holding engine-private files.
pub const STATE_DIR: &str = ".kiln";

const STATE_FILE: &str = "state.bin";
const FAILURE_MARKER: &str = ".failed";

/// Magic bytes identifying a kiln build state file.
const STATE_MAGIC: [u8; 4] = *b"KILN";

/// Current state format version. Increment on breaking changes to
/// the header or payload format.
const STATE_FORMAT_VERSION: u32 = 1;

/// Header prepended to every state file for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateHeader {
    magic: [u8; 4],
    format_version: u32,
    tool_version: String,
    checksum: ContentHash,
}

/// Persists one [`BuildState`] per build variant of one project.
pub struct BuildStateStore {
    state_dir: PathBuf,
    tool_version: String,
}

impl BuildStateStore {
    /// Creates a store for the given project directory.
    pub fn new(project_dir: &Path, tool_version: &str) -> Self {
        Self {
            state_dir: project_dir.join(STATE_DIR).join("state"),
            tool_version: tool_version.to_string(),
        }
    }

    /// Returns the state file path for a variant.
    pub fn state_path(&self, variant: &BuildVariant) -> PathBuf {
        self.state_dir.join(variant.key()).join(STATE_FILE)
    }

    fn marker_path(&self, variant: &BuildVariant) -> PathBuf {
        self.state_dir.join(variant.key()).join(FAILURE_MARKER)
    }

    /// Loads the persisted state for a variant, validating the file framing.
    ///
    /// Returns `None` if the file is missing, the header is invalid, the
    /// format version does not match, the checksum does not verify, or the
    /// stored variant is not the requested one. A lingering failure marker
    /// forces `full_rebuild_needed` on whatever loads.
    pub fn load(&self, variant: &BuildVariant) -> Option<BuildState> {
        let raw = std::fs::read(self.state_path(variant)).ok()?;

        // Need at least 4 bytes for the header length
        if raw.len() < 4 {
            return None;
        }
        let header_len = u32::from_le_bytes(raw[..4].try_into().ok()?) as usize;
        if raw.len() < 4 + header_len {
            return None;
        }

        let header: StateHeader =
            bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
                .ok()?
                .0;
        if header.magic != STATE_MAGIC {
            return None;
        }
        if header.format_version != STATE_FORMAT_VERSION {
            return None;
        }

        let payload = &raw[4 + header_len..];
        if ContentHash::from_bytes(payload) != header.checksum {
            return None;
        }

        let mut state: BuildState =
            bincode::serde::decode_from_slice(payload, bincode::config::standard())
                .ok()?
                .0;
        if state.variant != *variant {
            return None;
        }
        if self.has_failure_marker(variant) {
            state.full_rebuild_needed = true;
        }
        Some(state)
    }

    /// Loads the persisted state, or the never-built state when nothing
    /// trustworthy is on disk.
    pub fn load_or_default(&self, variant: &BuildVariant) -> BuildState {
        self.load(variant)
            .unwrap_or_else(|| BuildState::new(variant.clone()))
    }

    /// Persists a variant's state atomically.
    pub fn save(&self, state: &BuildState) -> Result<(), StateError> {
        let path = self.state_path(&state.variant);
        let dir = path.parent().unwrap_or(&self.state_dir);
        std::fs::create_dir_all(dir).map_err(|e| StateError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let payload = bincode::serde::encode_to_vec(state, bincode::config::standard()).map_err(
            |e| StateError::Serialization {
                reason: e.to_string(),
            },
        )?;
        let header = StateHeader {
            magic: STATE_MAGIC,
            format_version: STATE_FORMAT_VERSION,
            tool_version: self.tool_version.clone(),
            checksum: ContentHash::from_bytes(&payload),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| StateError::Serialization {
                reason: e.to_string(),
            })?;

        // Write: 4-byte header length (little-endian) + header + payload
        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&payload);

        let tmp = path.with_extension("bin.tmp");
        std::fs::write(&tmp, &output).map_err(|e| StateError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| StateError::Io { path, source: e })
    }

    /// Drops a variant's persisted files entirely.
    pub fn discard(&self, variant: &BuildVariant) -> Result<(), StateError> {
        let dir = self.state_dir.join(variant.key());
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| StateError::Io {
                path: dir,
                source: e,
            })?;
        }
        Ok(())
    }

    /// Leaves the marker that makes the next build unconditionally full,
    /// independent of whether saving the state record itself succeeds.
    pub fn write_failure_marker(&self, variant: &BuildVariant) -> Result<(), StateError> {
        let path = self.marker_path(variant);
        let dir = path.parent().unwrap_or(&self.state_dir);
        std::fs::create_dir_all(dir).map_err(|e| StateError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        std::fs::write(&path, b"").map_err(|e| StateError::Io { path, source: e })
    }

    /// Removes the failure marker after a successful build.
    pub fn clear_failure_marker(&self, variant: &BuildVariant) -> Result<(), StateError> {
        let path = self.marker_path(variant);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::Io { path, source: e }),
        }
    }

    /// Returns `true` if a previous build left the failure marker.
    pub fn has_failure_marker(&self, variant: &BuildVariant) -> bool {
        self.marker_path(variant).exists()
    }
}
