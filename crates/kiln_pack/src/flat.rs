//! The flat image format: a raw program image with a manifest sidecar.
//!
//! Used for targets that load images directly, such as emulators and
//! on-device test harnesses.

use crate::error::PackError;
use crate::{PackageContext, PackageManifest, Packager};
use std::path::PathBuf;

/// Packages a program image as a raw `.img` copy plus a `.json` manifest.
#[derive(Debug)]
pub struct FlatPackager;

impl FlatPackager {
    /// Creates the flat packager.
    pub fn new() -> Self {
        Self
    }
}

impl Default for FlatPackager {
    fn default() -> Self {
        Self::new()
    }
}

impl Packager for FlatPackager {
    fn platform(&self) -> &'static str {
        "flat"
    }

    fn create_package(&self, ctx: &PackageContext) -> Result<PathBuf, PackError> {
        if !ctx.input_image.exists() {
            return Err(PackError::MissingImage(ctx.input_image.clone()));
        }
        std::fs::create_dir_all(&ctx.output_dir).map_err(|e| PackError::Io {
            path: ctx.output_dir.clone(),
            source: e,
        })?;

        let image_path = ctx.output_dir.join(format!("{}.img", ctx.app_name));
        std::fs::copy(&ctx.input_image, &image_path).map_err(|e| PackError::Io {
            path: image_path.clone(),
            source: e,
        })?;

        let manifest = PackageManifest::for_context(ctx);
        let json = serde_json::to_string_pretty(&manifest).map_err(|e| PackError::Manifest {
            reason: e.to_string(),
        })?;
        let manifest_path = ctx.output_dir.join(format!("{}.json", ctx.app_name));
        std::fs::write(&manifest_path, json).map_err(|e| PackError::Io {
            path: manifest_path,
            source: e,
        })?;

        Ok(image_path)
    }
}
