//! Contracts for the external toolchain collaborators.
//!
//! The pipeline drives the toolchain through these traits. The process
//! backed implementations live in [`crate::external`]; tests substitute
//! in-memory implementations.

use crate::error::BuildError;
use kiln_diagnostics::DiagnosticSink;
use kiln_state::TreeDiff;
use std::path::{Path, PathBuf};

/// Per-variant options handed to each tool invocation.
#[derive(Clone, Debug, Default)]
pub struct ToolInvocation {
    /// Flags passed through to the tool command line.
    pub flags: Vec<String>,
    /// Preprocessor-style definitions from the active configuration.
    pub defines: Vec<String>,
    /// Opaque runtime tag the target profile selects, if any.
    pub runtime: Option<String>,
}

/// What the compiler produced for one batch of source files.
#[derive(Clone, Debug, Default)]
pub struct CompileOutput {
    /// Object files written, one per source file that compiled cleanly.
    pub object_files: Vec<PathBuf>,
    /// Total error diagnostics across the batch.
    pub error_count: usize,
    /// Discovered dependency edges, source file to the files it reads.
    pub dependencies: Vec<(PathBuf, Vec<PathBuf>)>,
}

/// How the linker should interpret its inputs and output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkMode {
    /// Produce an executable program image.
    Application,
    /// Produce a static library for other projects to link against.
    Library,
    /// Emit the intermediate-representation listing instead of an image.
    Intermediate,
}

/// One link invocation: inputs, libraries, mode, and destination.
#[derive(Clone, Debug)]
pub struct LinkRequest {
    /// Object files (or an eliminated listing) to link.
    pub inputs: Vec<PathBuf>,
    /// Directories searched for dependency libraries.
    pub library_paths: Vec<PathBuf>,
    /// Names of dependency libraries to link against.
    pub libraries: Vec<String>,
    /// Output interpretation.
    pub mode: LinkMode,
    /// Where the linked output is written.
    pub output: PathBuf,
    /// Linker flags for the variant.
    pub flags: Vec<String>,
    /// Runtime tag forwarded from the profile, if any.
    pub runtime: Option<String>,
}

/// Compiles source files to object files.
pub trait Compiler {
    /// Compiles `sources`, writing objects into `obj_dir`.
    ///
    /// Per-file errors are reported through `sink` and counted in the
    /// returned output; they do not abort the rest of the batch. An
    /// error return means the tool itself failed to run.
    fn compile(
        &self,
        sources: &[PathBuf],
        obj_dir: &Path,
        options: &ToolInvocation,
        sink: &DiagnosticSink,
    ) -> Result<CompileOutput, BuildError>;
}

/// Assembles resource files into one bundle.
pub trait ResourceAssembler {
    /// Assembles `resources` into the bundle at `bundle`.
    ///
    /// The diff describes what changed since the last build, `None`
    /// meaning everything must be treated as changed. Returns the list
    /// of resource files that were processed.
    fn assemble(
        &self,
        resources: &[PathBuf],
        bundle: &Path,
        diff: Option<&TreeDiff>,
        sink: &DiagnosticSink,
    ) -> Result<Vec<PathBuf>, BuildError>;
}

/// Links object files into a program image, library, or IR listing.
pub trait Linker {
    /// Performs one link according to `request`.
    fn link(&self, request: &LinkRequest, sink: &DiagnosticSink) -> Result<(), BuildError>;
}

/// Strips unused code from an intermediate-representation listing.
pub trait Eliminator {
    /// Reads `listing` and writes the eliminated listing to `output`.
    fn eliminate(
        &self,
        listing: &Path,
        output: &Path,
        sink: &DiagnosticSink,
    ) -> Result<(), BuildError>;
}
