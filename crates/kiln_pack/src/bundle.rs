//! The compressed `.kpk` bundle format.
//!
//! A bundle is a gzip stream framing the manifest ahead of the program
//! image: a 4-byte little-endian manifest length, the manifest JSON, then
//! the raw image bytes.

use crate::error::PackError;
use crate::{PackageContext, PackageManifest, Packager};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::PathBuf;

/// Packages a program image into a compressed `.kpk` bundle.
#[derive(Debug)]
pub struct BundlePackager;

impl BundlePackager {
    /// Creates the bundle packager.
    pub fn new() -> Self {
        Self
    }
}

impl Default for BundlePackager {
    fn default() -> Self {
        Self::new()
    }
}

impl Packager for BundlePackager {
    fn platform(&self) -> &'static str {
        "bundle"
    }

    fn create_package(&self, ctx: &PackageContext) -> Result<PathBuf, PackError> {
        if !ctx.input_image.exists() {
            return Err(PackError::MissingImage(ctx.input_image.clone()));
        }
        let image = std::fs::read(&ctx.input_image).map_err(|e| PackError::Io {
            path: ctx.input_image.clone(),
            source: e,
        })?;

        let manifest = PackageManifest::for_context(ctx);
        let manifest_bytes =
            serde_json::to_vec(&manifest).map_err(|e| PackError::Manifest {
                reason: e.to_string(),
            })?;

        std::fs::create_dir_all(&ctx.output_dir).map_err(|e| PackError::Io {
            path: ctx.output_dir.clone(),
            source: e,
        })?;
        let path = ctx.output_dir.join(format!("{}.kpk", ctx.app_name));
        let file = std::fs::File::create(&path).map_err(|e| PackError::Io {
            path: path.clone(),
            source: e,
        })?;

        let mut encoder = GzEncoder::new(file, Compression::default());
        let write_err = |e| PackError::Io {
            path: path.clone(),
            source: e,
        };
        let manifest_len = manifest_bytes.len() as u32;
        encoder
            .write_all(&manifest_len.to_le_bytes())
            .map_err(write_err)?;
        encoder.write_all(&manifest_bytes).map_err(write_err)?;
        encoder.write_all(&image).map_err(write_err)?;
        encoder.finish().map_err(write_err)?;

        Ok(path)
    }
}
