//! Build sessions: which stages run, for which variants.
//!
//! A [`BuildSession`] is created once per top-level build invocation and
//! shared by every variant built during it. The stage flags are validated
//! at construction, so an illegal combination is rejected before any
//! state is loaded or any tool runs.

use crate::error::BuildError;
use kiln_common::BuildVariant;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;

/// Property key under which the generated application identifier is cached.
pub const APP_ID_PROPERTY: &str = "app.id";

/// One requestable pipeline stage.
///
/// Compilation is not listed: it always runs for whatever the diff says
/// is affected. The flags gate the stages around it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Delete all outputs for the variant before building.
    Clean,
    /// Assemble the resource bundle before compiling.
    BuildResources,
    /// Link the compiled objects into an image.
    Link,
    /// Produce the platform package from the combined image.
    Package,
}

const CLEAN: u8 = 1 << 0;
const BUILD_RESOURCES: u8 = 1 << 1;
const LINK: u8 = 1 << 2;
const PACKAGE: u8 = 1 << 3;

fn bit(stage: Stage) -> u8 {
    match stage {
        Stage::Clean => CLEAN,
        Stage::BuildResources => BUILD_RESOURCES,
        Stage::Link => LINK,
        Stage::Package => PACKAGE,
    }
}

/// A validated set of requested stages.
///
/// Packaging requires linking, and linking requires resource building,
/// because each stage consumes the previous stage's output. Combinations
/// that violate the chain cannot be constructed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageSet {
    bits: u8,
}

impl StageSet {
    /// Builds a stage set from the given stages, rejecting illegal
    /// combinations.
    pub fn new(stages: &[Stage]) -> Result<Self, BuildError> {
        let mut bits = 0;
        for stage in stages {
            bits |= bit(*stage);
        }
        if bits & PACKAGE != 0 && bits & LINK == 0 {
            return Err(BuildError::InvalidSession {
                reason: "packaging requires linking".to_string(),
            });
        }
        if bits & LINK != 0 && bits & BUILD_RESOURCES == 0 {
            return Err(BuildError::InvalidSession {
                reason: "linking requires resource building".to_string(),
            });
        }
        Ok(Self { bits })
    }

    const fn from_bits(bits: u8) -> Self {
        Self { bits }
    }

    /// Returns `true` if the given stage was requested.
    pub fn contains(self, stage: Stage) -> bool {
        self.bits & bit(stage) != 0
    }

    /// Returns `true` if cleaning is the only requested stage.
    pub fn is_clean_only(self) -> bool {
        self.bits == CLEAN
    }
}

/// One top-level build request: stages, variants, and shared properties.
///
/// The property bag caches values that are expensive or non-deterministic
/// to compute, such as a generated application identifier, so that every
/// variant built in the same session agrees on them.
#[derive(Debug)]
pub struct BuildSession {
    stages: StageSet,
    variants: Vec<BuildVariant>,
    properties: Mutex<HashMap<String, String>>,
}

impl BuildSession {
    /// Creates a session from an already validated stage set.
    pub fn new(stages: StageSet, variants: Vec<BuildVariant>) -> Self {
        Self {
            stages,
            variants,
            properties: Mutex::new(HashMap::new()),
        }
    }

    /// Session that assembles resources and compiles, with no link,
    /// package, or clean.
    pub fn compile_only(variant: BuildVariant) -> Self {
        Self::new(StageSet::from_bits(BUILD_RESOURCES), vec![variant])
    }

    /// Session that runs every stage except clean.
    pub fn default_build(variant: BuildVariant) -> Self {
        Self::new(
            StageSet::from_bits(BUILD_RESOURCES | LINK | PACKAGE),
            vec![variant],
        )
    }

    /// Session that cleans first, then runs every stage.
    pub fn clean_build(variant: BuildVariant) -> Self {
        Self::new(
            StageSet::from_bits(CLEAN | BUILD_RESOURCES | LINK | PACKAGE),
            vec![variant],
        )
    }

    /// Session that only deletes the variant's outputs.
    pub fn clean_only(variant: BuildVariant) -> Self {
        Self::new(StageSet::from_bits(CLEAN), vec![variant])
    }

    /// Export session: every stage, for each of the given variants in order.
    pub fn finalizer_build(variants: Vec<BuildVariant>) -> Self {
        Self::new(
            StageSet::from_bits(CLEAN | BUILD_RESOURCES | LINK | PACKAGE),
            variants,
        )
    }

    /// Returns the validated stage set.
    pub fn stages(&self) -> StageSet {
        self.stages
    }

    /// Returns `true` if the given stage was requested.
    pub fn is_requested(&self, stage: Stage) -> bool {
        self.stages.contains(stage)
    }

    /// Returns the variants to build, in request order.
    pub fn variants(&self) -> &[BuildVariant] {
        &self.variants
    }

    /// Returns the value of a shared session property.
    pub fn property(&self, key: &str) -> Option<String> {
        self.properties.lock().unwrap().get(key).cloned()
    }

    /// Sets a shared session property, replacing any previous value.
    pub fn set_property(&self, key: impl Into<String>, value: impl Into<String>) {
        self.properties
            .lock()
            .unwrap()
            .insert(key.into(), value.into());
    }

    /// Returns the application identifier for this session.
    ///
    /// A configured identifier wins. Otherwise the first caller generates
    /// one and caches it under [`APP_ID_PROPERTY`], so every later stage
    /// and variant in the session sees the same identifier.
    pub fn app_id(&self, configured: Option<&str>) -> String {
        if let Some(id) = configured {
            return id.to_string();
        }
        let mut properties = self.properties.lock().unwrap();
        if let Some(id) = properties.get(APP_ID_PROPERTY) {
            return id.clone();
        }
        let mut rng = rand::thread_rng();
        let id = format!("app-{:08x}", rng.gen::<u32>());
        properties.insert(APP_ID_PROPERTY.to_string(), id.clone());
        id
    }
}
