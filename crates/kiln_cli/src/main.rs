//! Kiln CLI — the command-line interface for the Kiln build engine.
//!
//! Provides `kiln build` for incremental builds, `kiln check` for a
//! compile-only pass, `kiln rebuild` for a clean build, `kiln clean` for
//! removing build outputs, and `kiln dist` for finalizer (export) builds
//! across one or more target profiles.

#![warn(missing_docs)]

mod build;
mod check;
mod clean;
mod dist;
mod project;
mod rebuild;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Kiln — an incremental build engine for cross-compiled applications.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Kiln build engine")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Path to a custom `kiln.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the project incrementally (resources, compile, link, package).
    Build(BuildArgs),
    /// Compile affected sources without linking or packaging.
    Check(BuildArgs),
    /// Clean first, then build everything from scratch.
    Rebuild(BuildArgs),
    /// Remove all build outputs for a variant.
    Clean(BuildArgs),
    /// Run finalizer (export) builds for one or more profiles.
    Dist(DistArgs),
}

/// Arguments shared by the single-variant subcommands.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Target profile name from `kiln.toml`. Defaults to the only profile
    /// when exactly one is defined.
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Build configuration id (e.g. `release`).
    #[arg(short = 'C', long)]
    pub configuration: Option<String>,

    /// Output format for diagnostics.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `kiln dist` subcommand.
#[derive(Parser, Debug)]
pub struct DistArgs {
    /// Profiles to export. When empty, every profile in `kiln.toml` is built.
    pub profiles: Vec<String>,

    /// Build configuration id applied to every exported variant.
    #[arg(short = 'C', long)]
    pub configuration: Option<String>,

    /// Output format for diagnostics.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from terminal capabilities.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Diagnostic output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let color = match cli.color {
        ColorChoice::Auto => atty_is_terminal(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        color,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Build(ref args) => build::run(args, &global),
        Command::Check(ref args) => check::run(args, &global),
        Command::Rebuild(ref args) => rebuild::run(args, &global),
        Command::Clean(ref args) => clean::run(args, &global),
        Command::Dist(ref args) => dist::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Rough terminal detection — checks if stdout is a terminal.
fn atty_is_terminal() -> bool {
    // Use a simple heuristic: check the TERM env var.
    // In a real build we'd use the `is-terminal` crate, but this is
    // sufficient for now.
    std::env::var("TERM").is_ok()
}
