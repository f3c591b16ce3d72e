//! Configuration types deserialized from `kiln.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// The top-level project configuration parsed from `kiln.toml`.
///
/// Contains project metadata, toolchain commands, build profiles, named
/// configurations, library dependencies, and build/policy settings.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata (name, version, project type, etc.).
    pub project: ProjectMeta,
    /// Commands and flags for the external toolchain processes.
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    /// Named build profiles (e.g., "handset", "emulator").
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
    /// Named configurations overlaying defines and options on a profile.
    #[serde(default)]
    pub configurations: BTreeMap<String, ConfigurationOptions>,
    /// Library projects this project links against.
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,
    /// Build settings (dead code elimination, source layout).
    #[serde(default)]
    pub build: BuildOptions,
    /// Policies controlling rebuild behavior.
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Core project metadata required in every `kiln.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
    /// The project version string.
    pub version: String,
    /// Whether this project produces an application or a library.
    #[serde(default, rename = "type")]
    pub project_type: ProjectType,
    /// Stable application identifier used by packagers. Generated when absent.
    #[serde(default)]
    pub app_id: Option<String>,
    /// Vendor name embedded in package manifests.
    #[serde(default)]
    pub vendor: Option<String>,
    /// A brief description of the project.
    #[serde(default)]
    pub description: String,
}

/// The kind of artifact a project produces.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    /// A runnable application, linked and packaged (default).
    #[default]
    Application,
    /// A static library consumed by other projects; never packaged.
    Library,
}

/// Commands and default flags for the external toolchain processes.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolchainConfig {
    /// The compiler command.
    #[serde(default = "default_compiler")]
    pub compiler: String,
    /// The resource assembler command.
    #[serde(default = "default_resource_assembler")]
    pub resource_assembler: String,
    /// The linker command.
    #[serde(default = "default_linker")]
    pub linker: String,
    /// The dead code eliminator command.
    #[serde(default = "default_eliminator")]
    pub eliminator: String,
    /// Extra flags passed to every compiler invocation.
    #[serde(default)]
    pub compiler_flags: Vec<String>,
    /// Extra flags passed to every linker invocation.
    #[serde(default)]
    pub linker_flags: Vec<String>,
}

fn default_compiler() -> String {
    "kiln-cc".to_string()
}

fn default_resource_assembler() -> String {
    "kiln-res".to_string()
}

fn default_linker() -> String {
    "kiln-ld".to_string()
}

fn default_eliminator() -> String {
    "kiln-elim".to_string()
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: default_compiler(),
            resource_assembler: default_resource_assembler(),
            linker: default_linker(),
            eliminator: default_eliminator(),
            compiler_flags: Vec::new(),
            linker_flags: Vec::new(),
        }
    }
}

/// Configuration for a named build profile (a device class or platform).
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    /// The platform identifier resolved to a packager (e.g., "bundle", "flat").
    pub platform: String,
    /// Optional runtime library linked into application images.
    #[serde(default)]
    pub runtime: Option<String>,
    /// Whether linking goes through an intermediate representation pass.
    #[serde(default)]
    pub ir_link_pass: bool,
    /// Platform-specific parameters forwarded to the packager.
    #[serde(default)]
    pub pack_params: BTreeMap<String, String>,
}

/// Options a named configuration overlays on top of a profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigurationOptions {
    /// Preprocessor symbols defined for every compile.
    #[serde(default)]
    pub define: Vec<String>,
    /// Overrides the project-wide dead code elimination setting.
    #[serde(default)]
    pub dead_code_elim: Option<bool>,
    /// Extra compiler flags appended after the toolchain defaults.
    #[serde(default)]
    pub compiler_flags: Vec<String>,
}

/// Specification of a library project dependency.
///
/// Uses serde's untagged enum to accept both the shorthand string form
/// (`utils = "../libutils"`) and the full table form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// Shorthand form: the filesystem path to the dependency project.
    Shorthand(String),
    /// Full table form with an explicit path.
    Path {
        /// The filesystem path to the dependency project.
        path: String,
    },
}

impl DependencySpec {
    /// Returns the filesystem path to the dependency project directory.
    pub fn path(&self) -> &str {
        match self {
            DependencySpec::Shorthand(path) => path,
            DependencySpec::Path { path } => path,
        }
    }
}

/// Build configuration controlling elimination and source layout.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildOptions {
    /// Whether unused code is eliminated before the final link.
    #[serde(default)]
    pub dead_code_elim: bool,
    /// Directories scanned for source files (e.g., `"src"` or `["src", "gen"]`).
    ///
    /// Accepts either a single string or a list of strings.
    #[serde(
        default = "default_source_dirs",
        deserialize_with = "deserialize_string_or_vec"
    )]
    pub source_dirs: Vec<String>,
    /// Directories scanned for resource files.
    ///
    /// Accepts either a single string or a list of strings.
    #[serde(
        default = "default_resource_dirs",
        deserialize_with = "deserialize_string_or_vec"
    )]
    pub resource_dirs: Vec<String>,
    /// File extensions treated as compilation units within source directories.
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,
}

fn default_source_dirs() -> Vec<String> {
    vec!["src".to_string()]
}

fn default_resource_dirs() -> Vec<String> {
    vec!["res".to_string()]
}

fn default_source_extensions() -> Vec<String> {
    vec!["c".to_string(), "cpp".to_string()]
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            dead_code_elim: false,
            source_dirs: default_source_dirs(),
            resource_dirs: default_resource_dirs(),
            source_extensions: default_source_extensions(),
        }
    }
}

/// Deserializes a field that can be either a single string or a list of strings.
///
/// Allows TOML config to accept both `source_dirs = "src"` (string) and
/// `source_dirs = ["src", "gen"]` (array of strings).
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

/// Policies controlling when a full rebuild is forced.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Whether a canceled build forces a full rebuild on the next run.
    #[serde(default = "default_true")]
    pub canceled_build_full_rebuild: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            canceled_build_full_rebuild: true,
        }
    }
}
