//! `kiln build` — incremental default build.
//!
//! Runs every stage except clean: resource assembly, compilation of the
//! affected sources, the link decision, combine, and packaging. When the
//! persisted state is valid and nothing changed, no tool runs at all.

use kiln_engine::BuildSession;

use crate::project::{execute, make_variant, resolve_project_root, select_profile};
use crate::{BuildArgs, GlobalArgs};

/// Runs the `kiln build` command.
///
/// Returns exit code 0 on success, 1 on a failed build.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project_dir = resolve_project_root(global)?;
    let config = kiln_config::load_config(&project_dir)?;

    let profile = select_profile(&config, args.profile.as_deref())?;
    let variant = make_variant(profile, args.configuration.as_deref());
    let session = BuildSession::default_build(variant);

    execute(&project_dir, &config, &session, args.format, global)
}
