//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::path::Path;

/// The configuration file name looked up in a project directory.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Loads and validates a `kiln.toml` configuration from a project directory.
///
/// Reads `<project_dir>/kiln.toml`, parses it, and validates required fields.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `kiln.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present and configuration values are consistent.
fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    if config.project.version.is_empty() {
        return Err(ConfigError::MissingField("project.version".to_string()));
    }
    if let Some(app_id) = &config.project.app_id {
        if app_id.is_empty() {
            return Err(ConfigError::ValidationError(
                "project.app_id must not be empty".to_string(),
            ));
        }
    }
    for (name, profile) in &config.profiles {
        if profile.platform.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "profile '{name}' has no platform"
            )));
        }
    }
    for (name, dep) in &config.dependencies {
        if dep.path().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "dependency '{name}' has an empty path"
            )));
        }
    }
    Ok(())
}
