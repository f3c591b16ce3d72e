//! `kiln dist` — finalizer (export) builds.
//!
//! Builds release artifacts for one or more profiles with finalizer
//! semantics: always clean first, run every stage, and package into
//! `dist/<profile>/` instead of the variant work tree.

use kiln_common::BuildVariant;
use kiln_engine::BuildSession;

use crate::project::{execute, resolve_project_root};
use crate::{DistArgs, GlobalArgs};

/// Runs the `kiln dist` command.
///
/// Exports every requested profile (all profiles when none are named),
/// in order. Returns exit code 0 when every variant succeeded.
pub fn run(args: &DistArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project_dir = resolve_project_root(global)?;
    let config = kiln_config::load_config(&project_dir)?;

    let profiles: Vec<String> = if args.profiles.is_empty() {
        config.profiles.keys().cloned().collect()
    } else {
        args.profiles.clone()
    };
    if profiles.is_empty() {
        return Err("no profiles defined in kiln.toml".into());
    }

    let variants: Vec<BuildVariant> = profiles
        .into_iter()
        .map(|profile| {
            let variant = BuildVariant::new(profile).as_finalizer();
            match args.configuration.as_deref() {
                Some(id) => variant.with_config_id(id),
                None => variant,
            }
        })
        .collect();
    let session = BuildSession::finalizer_build(variants);

    execute(&project_dir, &config, &session, args.format, global)
}
