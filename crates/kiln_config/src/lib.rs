//! Parsing and validation of `kiln.toml` project configuration files.
//!
//! This crate reads the project configuration file and produces a strongly-typed
//! [`ProjectConfig`] with profile resolution, configuration overlays, and a
//! fingerprint of the build-affecting settings for change detection.

#![warn(missing_docs)]

pub mod error;
pub mod fingerprint;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use fingerprint::config_fingerprint;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use resolve::{resolve_profile, ResolvedProfile};
pub use types::*;
