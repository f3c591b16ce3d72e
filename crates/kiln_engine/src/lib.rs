//! Incremental build engine for the Kiln toolchain.
//!
//! This crate drives one project's builds end to end: it loads persisted
//! build state, diffs the project tree against it, propagates changes
//! through the recorded include graph, and runs the external toolchain
//! over whatever is affected.
//!
//! A build session runs these stages per variant:
//! 1. **Clean**, when requested, deleting the variant's outputs
//! 2. **Resources**, assembling the resource bundle
//! 3. **Compile**, always, for the files the diff marks affected
//! 4. **Link and eliminate**, when requested and the objects or
//!    dependency libraries moved
//! 5. **Combine**, concatenating image and bundle into the artifact
//! 6. **Package**, turning the artifact into the platform's format
//!
//! State is persisted on every exit path, including failures and
//! cancellation, so a broken run can never poison the next one.
//!
//! # Usage
//!
//! ```ignore
//! use kiln_engine::{BuildSession, Pipeline};
//! let pipeline = Pipeline::new(&project_dir, &config, &registry);
//! let reports = pipeline.run(&BuildSession::default_build(variant))?;
//! ```

#![warn(missing_docs)]

pub mod cancel;
pub mod error;
pub mod external;
pub mod fsops;
pub mod layout;
pub mod pipeline;
pub mod session;
pub mod tools;

pub use cancel::CancelToken;
pub use error::BuildError;
pub use external::{
    ExternalCompiler, ExternalEliminator, ExternalLinker, ExternalResourceAssembler, ToolSet,
};
pub use layout::{object_file_name, VariantLayout};
pub use pipeline::{BuildLog, BuildReport, ConsoleLog, Pipeline, SilentLog};
pub use session::{BuildSession, Stage, StageSet, APP_ID_PROPERTY};
pub use tools::{
    CompileOutput, Compiler, Eliminator, LinkMode, LinkRequest, Linker, ResourceAssembler,
    ToolInvocation,
};
