//! Blocking execution of external toolchain processes.
//!
//! The [`ProcessRunner`] spawns a tool, streams its standard output and
//! error line-by-line to a [`LineHandler`], and reports the exit status as a
//! [`ProcessOutcome`] once the process finishes. An [`IndentAggregator`]
//! joins indented continuation lines back onto the diagnostic line they
//! belong to before the handler sees them.

#![warn(missing_docs)]

pub mod aggregate;
pub mod error;
pub mod runner;

pub use aggregate::IndentAggregator;
pub use error::ProcessError;
pub use runner::{LineHandler, ProcessOutcome, ProcessRunner};
