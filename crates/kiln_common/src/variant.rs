//! Build variant identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one buildable target: a target profile, an optional build
/// configuration id, and whether this is a finalizer (release/export) build.
///
/// Variants are immutable values created per build request. Two variants are
/// equal iff all three fields match; every per-variant path (state directory,
/// work tree, packaged output) is derived from [`key`](Self::key), so unequal
/// variants never share on-disk state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildVariant {
    /// The target profile name from the project configuration.
    pub profile: String,
    /// The build configuration id, when a named configuration is selected.
    pub config_id: Option<String>,
    /// Whether this variant uses finalizer (export) output placement.
    pub finalizer: bool,
}

impl BuildVariant {
    /// Creates a non-finalizer variant for a profile with no configuration id.
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            config_id: None,
            finalizer: false,
        }
    }

    /// Sets the build configuration id.
    pub fn with_config_id(mut self, config_id: impl Into<String>) -> Self {
        self.config_id = Some(config_id.into());
        self
    }

    /// Marks this variant as a finalizer build.
    pub fn as_finalizer(mut self) -> Self {
        self.finalizer = true;
        self
    }

    /// Returns a filesystem-safe key unique to this variant.
    ///
    /// Lowercased profile, then the config id, then a `final` marker, joined
    /// with dashes. Any character outside `[a-z0-9_-]` becomes a dash.
    pub fn key(&self) -> String {
        let mut key = sanitize(&self.profile);
        if let Some(ref id) = self.config_id {
            key.push('-');
            key.push_str(&sanitize(id));
        }
        if self.finalizer {
            key.push_str("-final");
        }
        key
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.profile)?;
        if let Some(ref id) = self.config_id {
            write!(f, " [{id}]")?;
        }
        if self.finalizer {
            write!(f, " (finalizer)")?;
        }
        Ok(())
    }
}
