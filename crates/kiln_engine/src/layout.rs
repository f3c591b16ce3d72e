//! On-disk layout of a variant's build outputs.
//!
//! Every variant works in its own tree under `build/<variant-key>/`, so
//! variants never clobber each other. Finalizer variants place their
//! packaged output under `dist/<profile>/` instead of the work tree.

use crate::fsops;
use kiln_common::BuildVariant;
use std::io;
use std::path::{Path, PathBuf};

const BUILD_DIR: &str = "build";
const DIST_DIR: &str = "dist";
const OBJ_DIR: &str = "obj";
const RESOURCE_BUNDLE: &str = "app.res";
const IMAGE: &str = "app.img";
const IR_LISTING: &str = "app.ir";
const ELIMINATED_LISTING: &str = "app.elim";
const COMBINED: &str = "app.cmb";

/// Returns the object file name for a source file.
///
/// The relative source path is flattened into one component so the
/// object directory never needs subdirectories and two sources with the
/// same stem in different directories cannot collide.
pub fn object_file_name(source: &Path) -> String {
    let flat = source.to_string_lossy().replace(['/', '\\'], "__");
    format!("{flat}.o")
}

/// Resolved output paths for one (project, variant) pair.
#[derive(Clone, Debug)]
pub struct VariantLayout {
    build_dir: PathBuf,
    dist_dir: PathBuf,
    finalizer: bool,
}

impl VariantLayout {
    /// Computes the layout for `variant` under `project_dir`.
    pub fn new(project_dir: &Path, variant: &BuildVariant) -> Self {
        Self {
            build_dir: project_dir.join(BUILD_DIR).join(variant.key()),
            dist_dir: project_dir.join(DIST_DIR).join(&variant.profile),
            finalizer: variant.finalizer,
        }
    }

    /// The variant's work tree, `build/<variant-key>/`.
    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Directory holding compiled object files.
    pub fn obj_dir(&self) -> PathBuf {
        self.build_dir.join(OBJ_DIR)
    }

    /// Object file path for one source file.
    pub fn object_path(&self, source: &Path) -> PathBuf {
        self.obj_dir().join(object_file_name(source))
    }

    /// The assembled resource bundle.
    pub fn resource_bundle(&self) -> PathBuf {
        self.build_dir.join(RESOURCE_BUNDLE)
    }

    /// The linked program image.
    pub fn image(&self) -> PathBuf {
        self.build_dir.join(IMAGE)
    }

    /// The intermediate-representation listing.
    pub fn ir_listing(&self) -> PathBuf {
        self.build_dir.join(IR_LISTING)
    }

    /// The listing after dead-code elimination.
    pub fn eliminated_listing(&self) -> PathBuf {
        self.build_dir.join(ELIMINATED_LISTING)
    }

    /// The combined image-plus-resources artifact.
    pub fn combined(&self) -> PathBuf {
        self.build_dir.join(COMBINED)
    }

    /// The library artifact for a library project named `name`.
    pub fn library(&self, name: &str) -> PathBuf {
        self.build_dir.join(format!("lib{name}.ka"))
    }

    /// Where packaged output lands.
    ///
    /// Finalizer variants package into the distribution tree; ordinary
    /// variants package into their own work tree.
    pub fn package_dir(&self) -> &Path {
        if self.finalizer {
            &self.dist_dir
        } else {
            &self.build_dir
        }
    }

    /// Deletes every output this variant has produced.
    pub fn clean(&self) -> io::Result<()> {
        fsops::remove_tree(&self.build_dir)?;
        if self.finalizer {
            fsops::remove_tree(&self.dist_dir)?;
        }
        Ok(())
    }
}
