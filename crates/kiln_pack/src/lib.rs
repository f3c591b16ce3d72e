//! Platform packaging of linked program images.
//!
//! This crate turns a combined program image into the artifact a target
//! platform installs: a compressed `.kpk` bundle or a flat image with a
//! manifest sidecar. It provides the [`Packager`] trait with one
//! implementation per platform and a [`create_packager`] factory that
//! resolves a platform identifier to its packager, so an unknown platform
//! fails at startup rather than after a long build.

#![warn(missing_docs)]

pub mod bundle;
pub mod error;
pub mod flat;

pub use error::PackError;

use kiln_common::BuildVariant;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything a packager needs to produce one platform artifact.
#[derive(Debug, Clone)]
pub struct PackageContext {
    /// The application name, used for artifact file names.
    pub app_name: String,
    /// The stable application identifier.
    pub app_id: String,
    /// The project version string.
    pub version: String,
    /// The vendor name embedded in the manifest.
    pub vendor: String,
    /// The variant being packaged.
    pub variant: BuildVariant,
    /// Platform-specific parameters from the profile.
    pub parameters: BTreeMap<String, String>,
    /// The combined program image to package.
    pub input_image: PathBuf,
    /// The directory the artifact is written into.
    pub output_dir: PathBuf,
}

/// The manifest every package format embeds or writes alongside itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    /// The application name.
    pub name: String,
    /// The stable application identifier.
    pub app_id: String,
    /// The project version string.
    pub version: String,
    /// The vendor name.
    pub vendor: String,
    /// The profile the package was built for.
    pub profile: String,
    /// Platform-specific parameters.
    pub parameters: BTreeMap<String, String>,
}

impl PackageManifest {
    /// Builds the manifest for a packaging run.
    pub fn for_context(ctx: &PackageContext) -> Self {
        Self {
            name: ctx.app_name.clone(),
            app_id: ctx.app_id.clone(),
            version: ctx.version.clone(),
            vendor: ctx.vendor.clone(),
            profile: ctx.variant.profile.clone(),
            parameters: ctx.parameters.clone(),
        }
    }
}

/// Trait for platform-specific packagers.
///
/// Implementations turn a combined program image into the installable
/// artifact for one platform. Packagers are stateless; everything a run
/// needs arrives in the [`PackageContext`].
pub trait Packager: std::fmt::Debug {
    /// The platform identifier this packager serves.
    fn platform(&self) -> &'static str;

    /// Creates the platform package and returns the path of the produced
    /// artifact. The caller verifies the artifact actually exists.
    fn create_package(&self, ctx: &PackageContext) -> Result<PathBuf, PackError>;
}

/// Resolves a platform identifier to its packager.
///
/// Called once when a build session is set up, so a profile naming an
/// unknown platform fails before any compilation happens.
pub fn create_packager(platform: &str) -> Result<Box<dyn Packager>, PackError> {
    match platform.to_lowercase().as_str() {
        "bundle" => Ok(Box::new(bundle::BundlePackager::new())),
        "flat" => Ok(Box::new(flat::FlatPackager::new())),
        _ => Err(PackError::UnknownPlatform(platform.to_string())),
    }
}
