//! `kiln check` — compile-only pass.
//!
//! Assembles resources and compiles whatever the diff marks affected, but
//! never links or packages. The quickest way to surface compiler
//! diagnostics after an edit.

use kiln_engine::BuildSession;

use crate::project::{execute, make_variant, resolve_project_root, select_profile};
use crate::{BuildArgs, GlobalArgs};

/// Runs the `kiln check` command.
///
/// Returns exit code 0 if compilation produced no errors, 1 otherwise.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project_dir = resolve_project_root(global)?;
    let config = kiln_config::load_config(&project_dir)?;

    let profile = select_profile(&config, args.profile.as_deref())?;
    let variant = make_variant(profile, args.configuration.as_deref());
    let session = BuildSession::compile_only(variant);

    execute(&project_dir, &config, &session, args.format, global)
}
