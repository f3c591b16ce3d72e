//! Fingerprinting of build-affecting configuration.
//!
//! The fingerprint covers everything that changes the meaning of compiled
//! output: toolchain commands and flags, the resolved profile, and the
//! dependency set. Descriptive metadata stays out so editing a description
//! never invalidates a build.

use crate::error::ConfigError;
use crate::resolve::ResolvedProfile;
use crate::types::ProjectConfig;
use kiln_common::ContentHash;
use serde::Serialize;
use std::collections::BTreeMap;

/// The canonical serialization input for a configuration fingerprint.
///
/// Field order is fixed and all collections are sorted, so equal settings
/// always produce equal bytes.
#[derive(Serialize)]
struct FingerprintInput<'a> {
    compiler: &'a str,
    resource_assembler: &'a str,
    linker: &'a str,
    eliminator: &'a str,
    compiler_flags: &'a [String],
    linker_flags: &'a [String],
    platform: &'a str,
    runtime: Option<&'a str>,
    ir_link_pass: bool,
    dead_code_elim: bool,
    defines: &'a [String],
    pack_params: &'a BTreeMap<String, String>,
    dependencies: Vec<(&'a str, &'a str)>,
}

/// Computes the fingerprint of the build-affecting parts of a configuration.
///
/// Two configurations that compile, link, and package identically produce
/// the same fingerprint. A changed fingerprint invalidates persisted build
/// state and forces a full rebuild.
pub fn config_fingerprint(
    config: &ProjectConfig,
    resolved: &ResolvedProfile,
) -> Result<ContentHash, ConfigError> {
    let input = FingerprintInput {
        compiler: &config.toolchain.compiler,
        resource_assembler: &config.toolchain.resource_assembler,
        linker: &config.toolchain.linker,
        eliminator: &config.toolchain.eliminator,
        compiler_flags: &resolved.compiler_flags,
        linker_flags: &resolved.linker_flags,
        platform: &resolved.platform,
        runtime: resolved.runtime.as_deref(),
        ir_link_pass: resolved.ir_link_pass,
        dead_code_elim: resolved.dead_code_elim,
        defines: &resolved.defines,
        pack_params: &resolved.pack_params,
        dependencies: config
            .dependencies
            .iter()
            .map(|(name, spec)| (name.as_str(), spec.path()))
            .collect(),
    };
    let bytes =
        serde_json::to_vec(&input).map_err(|e| ConfigError::SerializationError(e.to_string()))?;
    Ok(ContentHash::from_bytes(&bytes))
}
