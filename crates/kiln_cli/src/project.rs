//! Shared helpers for CLI commands.
//!
//! Contains the pieces every subcommand needs: project root resolution
//! (walk up looking for `kiln.toml`), profile selection, session execution
//! through the engine, and diagnostic rendering in text or JSON form.

use std::path::{Path, PathBuf};

use kiln_common::BuildVariant;
use kiln_config::{ProjectConfig, CONFIG_FILE};
use kiln_deps::WorkspaceRegistry;
use kiln_diagnostics::{Diagnostic, Severity};
use kiln_engine::{BuildReport, BuildSession, ConsoleLog, Pipeline};

use crate::{GlobalArgs, ReportFormat};

/// Walks up from `start` looking for the nearest directory containing
/// `kiln.toml`.
///
/// Returns the directory containing `kiln.toml`, or an error if none is
/// found.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {} in {} or any parent directory",
                CONFIG_FILE,
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root directory from global CLI args.
///
/// If `--config` is specified, uses that path (file → parent dir, dir →
/// itself). Otherwise walks up from the current directory looking for
/// `kiln.toml`.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(ref config_path) = global.config {
        let p = PathBuf::from(config_path);
        if p.is_file() {
            Ok(p.parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")))
        } else {
            Ok(p)
        }
    } else {
        find_project_root(&std::env::current_dir()?)
    }
}

/// Picks the profile to build.
///
/// An explicit `--profile` wins (the engine validates it exists). With no
/// explicit choice the project's sole profile is used; when several are
/// defined the user has to pick one.
pub fn select_profile(
    config: &ProjectConfig,
    requested: Option<&str>,
) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(name) = requested {
        return Ok(name.to_string());
    }
    let mut names = config.profiles.keys();
    match (names.next(), names.next()) {
        (Some(only), None) => Ok(only.clone()),
        (None, _) => Err(format!("no profiles defined in {CONFIG_FILE}").into()),
        (Some(_), Some(_)) => {
            let all: Vec<_> = config.profiles.keys().cloned().collect();
            Err(format!(
                "multiple profiles defined ({}); select one with --profile",
                all.join(", ")
            )
            .into())
        }
    }
}

/// Builds the variant for a single-variant subcommand.
pub fn make_variant(profile: String, configuration: Option<&str>) -> BuildVariant {
    let variant = BuildVariant::new(profile);
    match configuration {
        Some(id) => variant.with_config_id(id),
        None => variant,
    }
}

/// Runs a session through the engine and renders the reports.
///
/// Returns the process exit code: 0 when every variant succeeded, 1 when
/// any failed. A canceled variant is incomplete, not failed, and does not
/// by itself flip the exit code.
pub fn execute(
    project_dir: &Path,
    config: &ProjectConfig,
    session: &BuildSession,
    format: ReportFormat,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let registry = WorkspaceRegistry::new();
    let pipeline = Pipeline::new(project_dir, config, &registry)
        .with_log(Box::new(ConsoleLog::new(global.quiet)));
    let reports = pipeline.run(session)?;

    match format {
        ReportFormat::Text => render_text(&reports, global),
        ReportFormat::Json => render_json(&reports)?,
    }

    let failed = reports.iter().any(|r| !r.canceled && !r.result.success);
    Ok(if failed { 1 } else { 0 })
}

const ANSI_RESET: &str = "\x1b[0m";

/// ANSI color code for a diagnostic severity.
fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "\x1b[31m",
        Severity::Warning => "\x1b[33m",
        Severity::Note => "\x1b[36m",
    }
}

/// Formats one diagnostic line, colored by severity when enabled.
fn render_diagnostic(diag: &Diagnostic, color: bool) -> String {
    if color {
        format!("{}{diag}{ANSI_RESET}", severity_color(diag.severity))
    } else {
        format!("{diag}")
    }
}

/// Prints diagnostics and a per-variant summary line to standard error.
fn render_text(reports: &[BuildReport], global: &GlobalArgs) {
    for report in reports {
        for diag in &report.diagnostics {
            eprintln!("{}", render_diagnostic(diag, global.color));
        }
        if global.quiet {
            continue;
        }
        if report.canceled {
            eprintln!("  Canceled {}", report.result.variant);
        } else if report.result.success {
            eprintln!(
                "  Finished {} ({} compiled)",
                report.result.variant, report.compiled
            );
            if let Some(ref artifact) = report.result.artifact {
                eprintln!("  Artifact {}", artifact.display());
            }
        } else {
            eprintln!(
                "    Failed {} ({} errors)",
                report.result.variant, report.result.error_count
            );
        }
        if global.verbose && !report.dependents.is_empty() {
            eprintln!("   Relinks {}", report.dependents.join(", "));
        }
    }
}

/// Prints one JSON object per variant to standard output.
fn render_json(reports: &[BuildReport]) -> Result<(), Box<dyn std::error::Error>> {
    let values: Vec<_> = reports
        .iter()
        .map(|report| {
            serde_json::json!({
                "variant": report.result.variant,
                "success": report.result.success,
                "canceled": report.canceled,
                "compiled": report.compiled,
                "error_count": report.result.error_count,
                "artifact": report.result.artifact,
                "diagnostics": report.diagnostics,
                "dependents": report.dependents,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&values)?);
    Ok(())
}
