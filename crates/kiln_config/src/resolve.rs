//! Profile resolution: merging project-wide settings with a named profile
//! and an optional configuration overlay.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::collections::BTreeMap;

/// A fully resolved build profile with configuration overlays applied.
///
/// Toolchain flags form the base and configuration flags append on top.
/// The configuration's dead code elimination setting, if present, overrides
/// the project-wide one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    /// The profile name.
    pub name: String,
    /// The platform identifier resolved to a packager.
    pub platform: String,
    /// Optional runtime library linked into application images.
    pub runtime: Option<String>,
    /// Whether linking goes through an intermediate representation pass.
    pub ir_link_pass: bool,
    /// Whether unused code is eliminated before the final link.
    pub dead_code_elim: bool,
    /// Preprocessor symbols defined for every compile.
    pub defines: Vec<String>,
    /// Merged compiler flags (toolchain base + configuration overlay).
    pub compiler_flags: Vec<String>,
    /// Linker flags from the toolchain settings.
    pub linker_flags: Vec<String>,
    /// Platform-specific parameters forwarded to the packager.
    pub pack_params: BTreeMap<String, String>,
}

/// Resolves a named profile, overlaying an optional named configuration.
///
/// Compiler flags are merged: toolchain flags form the base and configuration
/// flags append after them. Defines come from the configuration alone. The
/// dead code elimination setting falls back to `[build]` when the
/// configuration does not override it.
pub fn resolve_profile(
    config: &ProjectConfig,
    profile_name: &str,
    config_id: Option<&str>,
) -> Result<ResolvedProfile, ConfigError> {
    let profile = config
        .profiles
        .get(profile_name)
        .ok_or_else(|| ConfigError::UnknownProfile(profile_name.to_string()))?;

    let overlay = match config_id {
        Some(id) => Some(
            config
                .configurations
                .get(id)
                .ok_or_else(|| ConfigError::UnknownConfiguration(id.to_string()))?,
        ),
        None => None,
    };

    // Merge flags: start with toolchain defaults, append configuration extras
    let mut compiler_flags = config.toolchain.compiler_flags.clone();
    let mut defines = Vec::new();
    let mut dead_code_elim = config.build.dead_code_elim;
    if let Some(overlay) = overlay {
        compiler_flags.extend(overlay.compiler_flags.iter().cloned());
        defines.extend(overlay.define.iter().cloned());
        if let Some(elim) = overlay.dead_code_elim {
            dead_code_elim = elim;
        }
    }

    Ok(ResolvedProfile {
        name: profile_name.to_string(),
        platform: profile.platform.clone(),
        runtime: profile.runtime.clone(),
        ir_link_pass: profile.ir_link_pass,
        dead_code_elim,
        defines,
        compiler_flags,
        linker_flags: config.toolchain.linker_flags.clone(),
        pack_params: profile.pack_params.clone(),
    })
}
