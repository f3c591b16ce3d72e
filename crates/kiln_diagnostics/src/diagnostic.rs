//! Structured diagnostic messages with optional source locations.

use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A diagnostic reported during a build.
///
/// Most diagnostics originate as lines of external tool output and carry the
/// file and line the tool blamed. Engine-originated diagnostics (missing
/// resource file, packaging failure) may have no location at all.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity level of this diagnostic.
    pub severity: Severity,
    /// The diagnostic message.
    pub message: String,
    /// The file the diagnostic refers to, when known.
    pub file: Option<PathBuf>,
    /// The 1-based line number within `file`, when known.
    pub line: Option<u32>,
    /// The tool that produced the diagnostic (e.g. "compiler", "linker").
    pub tool: Option<String>,
}

impl Diagnostic {
    /// Creates a new error diagnostic with no location.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            file: None,
            line: None,
            tool: None,
        }
    }

    /// Creates a new warning diagnostic with no location.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            file: None,
            line: None,
            tool: None,
        }
    }

    /// Creates a new note diagnostic with no location.
    pub fn note(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Note,
            message: message.into(),
            file: None,
            line: None,
            tool: None,
        }
    }

    /// Attaches a file and line location.
    pub fn with_location(mut self, file: impl Into<PathBuf>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// Attaches the file without a line number.
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Records which tool produced this diagnostic.
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}:", file.display())?;
            if let Some(line) = self.line {
                write!(f, "{line}:")?;
            }
            write!(f, " ")?;
        }
        write!(f, "{}: {}", self.severity, self.message)
    }
}
