//! Structured diagnostics for external toolchain output.
//!
//! Compilers, linkers, and packagers report problems as text lines. This
//! crate parses the common `path:line: severity: message` shape into
//! structured [`Diagnostic`] values and accumulates them in a thread-safe
//! [`DiagnosticSink`] with a fast error count used by the build pipeline's
//! link and package gating.

#![warn(missing_docs)]

pub mod diagnostic;
pub mod parse;
pub mod severity;
pub mod sink;

pub use diagnostic::Diagnostic;
pub use parse::parse_tool_line;
pub use severity::Severity;
pub use sink::DiagnosticSink;
