//! Process-backed implementations of the toolchain contracts.
//!
//! Each implementation wraps one configured command and drives it
//! through [`ProcessRunner`], aggregating wrapped diagnostic lines and
//! parsing them into the shared [`DiagnosticSink`].

use crate::error::BuildError;
use crate::layout::object_file_name;
use crate::tools::{
    CompileOutput, Compiler, Eliminator, LinkMode, LinkRequest, Linker, ResourceAssembler,
    ToolInvocation,
};
use kiln_config::ToolchainConfig;
use kiln_diagnostics::{parse_tool_line, DiagnosticSink};
use kiln_process::{IndentAggregator, LineHandler, ProcessOutcome, ProcessRunner};
use kiln_state::TreeDiff;
use std::fs;
use std::path::{Path, PathBuf};

/// The full set of toolchain collaborators the pipeline drives.
pub struct ToolSet {
    /// Compiles source files to objects.
    pub compiler: Box<dyn Compiler>,
    /// Assembles the resource bundle.
    pub assembler: Box<dyn ResourceAssembler>,
    /// Links objects into images, libraries, and listings.
    pub linker: Box<dyn Linker>,
    /// Strips unused code from IR listings.
    pub eliminator: Box<dyn Eliminator>,
}

impl ToolSet {
    /// Builds the process-backed tool set from the configured commands.
    ///
    /// Every tool runs with `project_dir` as its working directory, so
    /// relative paths in tool output match the project's file tree.
    pub fn from_config(toolchain: &ToolchainConfig, project_dir: &Path) -> Self {
        Self {
            compiler: Box::new(ExternalCompiler::new(&toolchain.compiler, project_dir)),
            assembler: Box::new(ExternalResourceAssembler::new(
                &toolchain.resource_assembler,
                project_dir,
            )),
            linker: Box::new(ExternalLinker::new(&toolchain.linker, project_dir)),
            eliminator: Box::new(ExternalEliminator::new(&toolchain.eliminator, project_dir)),
        }
    }
}

/// Parses tool output lines into diagnostics as they stream in.
struct DiagnosticLineHandler<'a> {
    tool: &'a str,
    sink: &'a DiagnosticSink,
    errors: usize,
}

impl<'a> DiagnosticLineHandler<'a> {
    fn new(tool: &'a str, sink: &'a DiagnosticSink) -> Self {
        Self {
            tool,
            sink,
            errors: 0,
        }
    }
}

impl LineHandler for DiagnosticLineHandler<'_> {
    fn line(&mut self, line: &str) {
        if let Some(diag) = parse_tool_line(line) {
            if diag.severity.is_error() {
                self.errors += 1;
            }
            self.sink.emit(diag.with_tool(self.tool));
        }
    }
}

/// Runs one tool invocation, returning the outcome and the number of
/// error diagnostics it printed.
fn run_tool(
    runner: &ProcessRunner,
    command: &str,
    args: &[String],
    sink: &DiagnosticSink,
) -> Result<(ProcessOutcome, usize), BuildError> {
    let mut handler = IndentAggregator::new(DiagnosticLineHandler::new(command, sink));
    let outcome = runner.run(command, args, &mut handler)?;
    Ok((outcome, handler.into_inner().errors))
}

/// Describes why a tool invocation did not succeed.
fn failure_detail(outcome: &ProcessOutcome) -> String {
    if outcome.stopped() {
        return "output stream error".to_string();
    }
    match outcome.exit_code() {
        Some(code) => format!("exit code {code}"),
        None => "terminated by a signal".to_string(),
    }
}

/// Reads the dependency list a compiler invocation left next to its
/// object file. Unreadable or absent lists read as empty.
fn read_deps_file(path: &Path, project_dir: &Path) -> Vec<PathBuf> {
    let Ok(contents) = fs::read_to_string(path) else {
        return Vec::new();
    };
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let p = Path::new(line);
            p.strip_prefix(project_dir).unwrap_or(p).to_path_buf()
        })
        .collect()
}

/// Compiler backed by the configured compiler command.
///
/// Invokes the command once per source file. A nonzero exit that came
/// with error diagnostics is a compile error for that file and the rest
/// of the batch continues; a nonzero exit with no diagnostics means the
/// tool itself is broken and aborts the batch.
pub struct ExternalCompiler {
    command: String,
    project_dir: PathBuf,
    runner: ProcessRunner,
}

impl ExternalCompiler {
    /// Creates a compiler running `command` inside `project_dir`.
    pub fn new(command: impl Into<String>, project_dir: &Path) -> Self {
        Self {
            command: command.into(),
            project_dir: project_dir.to_path_buf(),
            runner: ProcessRunner::new().with_cwd(project_dir),
        }
    }
}

impl Compiler for ExternalCompiler {
    fn compile(
        &self,
        sources: &[PathBuf],
        obj_dir: &Path,
        options: &ToolInvocation,
        sink: &DiagnosticSink,
    ) -> Result<CompileOutput, BuildError> {
        let mut output = CompileOutput::default();
        for source in sources {
            let object = obj_dir.join(object_file_name(source));
            let mut args = options.flags.clone();
            for define in &options.defines {
                args.push(format!("-D{define}"));
            }
            if let Some(runtime) = &options.runtime {
                args.push(format!("--runtime={runtime}"));
            }
            args.push("-c".to_string());
            args.push(source.display().to_string());
            args.push("-o".to_string());
            args.push(object.display().to_string());

            let (outcome, errors) = run_tool(&self.runner, &self.command, &args, sink)?;
            if outcome.success() {
                let deps = read_deps_file(&object.with_extension("d"), &self.project_dir);
                output.dependencies.push((source.clone(), deps));
                output.object_files.push(object);
            } else if errors > 0 {
                output.error_count += errors;
            } else {
                return Err(BuildError::ToolFailed {
                    tool: self.command.clone(),
                    detail: failure_detail(&outcome),
                });
            }
        }
        Ok(output)
    }
}

/// Resource assembler backed by the configured command.
pub struct ExternalResourceAssembler {
    command: String,
    runner: ProcessRunner,
}

impl ExternalResourceAssembler {
    /// Creates an assembler running `command` inside `project_dir`.
    pub fn new(command: impl Into<String>, project_dir: &Path) -> Self {
        Self {
            command: command.into(),
            runner: ProcessRunner::new().with_cwd(project_dir),
        }
    }
}

impl ResourceAssembler for ExternalResourceAssembler {
    fn assemble(
        &self,
        resources: &[PathBuf],
        bundle: &Path,
        _diff: Option<&TreeDiff>,
        sink: &DiagnosticSink,
    ) -> Result<Vec<PathBuf>, BuildError> {
        let mut args = vec!["-o".to_string(), bundle.display().to_string()];
        args.extend(resources.iter().map(|r| r.display().to_string()));

        let (outcome, _) = run_tool(&self.runner, &self.command, &args, sink)?;
        if !outcome.success() {
            return Err(BuildError::ToolFailed {
                tool: self.command.clone(),
                detail: failure_detail(&outcome),
            });
        }
        Ok(resources.to_vec())
    }
}

fn mode_flag(mode: LinkMode) -> &'static str {
    match mode {
        LinkMode::Application => "--mode=app",
        LinkMode::Library => "--mode=lib",
        LinkMode::Intermediate => "--mode=ir",
    }
}

/// Linker backed by the configured command.
pub struct ExternalLinker {
    command: String,
    runner: ProcessRunner,
}

impl ExternalLinker {
    /// Creates a linker running `command` inside `project_dir`.
    pub fn new(command: impl Into<String>, project_dir: &Path) -> Self {
        Self {
            command: command.into(),
            runner: ProcessRunner::new().with_cwd(project_dir),
        }
    }
}

impl Linker for ExternalLinker {
    fn link(&self, request: &LinkRequest, sink: &DiagnosticSink) -> Result<(), BuildError> {
        let mut args = request.flags.clone();
        if let Some(runtime) = &request.runtime {
            args.push(format!("--runtime={runtime}"));
        }
        args.push(mode_flag(request.mode).to_string());
        args.push("-o".to_string());
        args.push(request.output.display().to_string());
        args.extend(request.inputs.iter().map(|i| i.display().to_string()));
        for path in &request.library_paths {
            args.push("-L".to_string());
            args.push(path.display().to_string());
        }
        for library in &request.libraries {
            args.push("-l".to_string());
            args.push(library.clone());
        }

        let (outcome, _) = run_tool(&self.runner, &self.command, &args, sink)?;
        if !outcome.success() {
            return Err(BuildError::ToolFailed {
                tool: self.command.clone(),
                detail: failure_detail(&outcome),
            });
        }
        Ok(())
    }
}

/// Dead-code eliminator backed by the configured command.
pub struct ExternalEliminator {
    command: String,
    runner: ProcessRunner,
}

impl ExternalEliminator {
    /// Creates an eliminator running `command` inside `project_dir`.
    pub fn new(command: impl Into<String>, project_dir: &Path) -> Self {
        Self {
            command: command.into(),
            runner: ProcessRunner::new().with_cwd(project_dir),
        }
    }
}

impl Eliminator for ExternalEliminator {
    fn eliminate(
        &self,
        listing: &Path,
        output: &Path,
        sink: &DiagnosticSink,
    ) -> Result<(), BuildError> {
        let args = vec![
            listing.display().to_string(),
            "-o".to_string(),
            output.display().to_string(),
        ];

        let (outcome, _) = run_tool(&self.runner, &self.command, &args, sink)?;
        if !outcome.success() {
            return Err(BuildError::ToolFailed {
                tool: self.command.clone(),
                detail: failure_detail(&outcome),
            });
        }
        Ok(())
    }
}
