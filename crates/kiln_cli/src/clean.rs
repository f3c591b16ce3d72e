//! `kiln clean` — remove a variant's build outputs.
//!
//! Deletes the variant's work tree and resets its persisted state to
//! valid-but-empty, so the next build starts from a clean slate without
//! being treated as a failure recovery.

use kiln_engine::BuildSession;

use crate::project::{execute, make_variant, resolve_project_root, select_profile};
use crate::{BuildArgs, GlobalArgs};

/// Runs the `kiln clean` command.
///
/// Returns exit code 0 on success, 1 if the outputs could not be removed.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project_dir = resolve_project_root(global)?;
    let config = kiln_config::load_config(&project_dir)?;

    let profile = select_profile(&config, args.profile.as_deref())?;
    let variant = make_variant(profile, args.configuration.as_deref());
    let session = BuildSession::clean_only(variant);

    execute(&project_dir, &config, &session, args.format, global)
}
