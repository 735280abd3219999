//! Error types for catalogue correlation.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Coarse error category, for callers that only branch on the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    MethodNotFound,
    InvalidInput,
    ExternalTool,
}

/// What went wrong while driving an external matching tool.
#[derive(Debug, Error)]
pub enum ToolFailure {
    #[error("executable '{name}' not found (searched: {searched})")]
    MissingExecutable { name: String, searched: String },

    #[error("failed to start process: {0}")]
    Spawn(#[source] io::Error),

    #[error("process terminated abnormally ({status})")]
    NonZeroExit { status: String },

    #[error("process did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("expected output '{}' was not produced", .0.display())]
    MissingOutput(PathBuf),

    #[error("malformed output '{}' at line {line}: {reason}", path.display())]
    MalformedOutput {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("i/o error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors that can occur during correlation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Matching method '{method}' is not available: {reason}")]
    MethodNotFound { method: String, reason: String },

    #[error("Invalid input catalogue: {0}")]
    InvalidInput(String),

    #[error("External tool '{tool}' failed: {failure}")]
    ExternalTool {
        tool: String,
        #[source]
        failure: ToolFailure,
        /// Captured stderr (or stdout when stderr was empty) of the tool, if any.
        diagnostics: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::MethodNotFound { .. } => ErrorKind::MethodNotFound,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::ExternalTool { .. } => ErrorKind::ExternalTool,
        }
    }

    pub(crate) fn tool(tool: impl Into<String>, failure: ToolFailure) -> Self {
        Error::ExternalTool {
            tool: tool.into(),
            failure,
            diagnostics: String::new(),
        }
    }

    pub(crate) fn tool_with_diagnostics(
        tool: impl Into<String>,
        failure: ToolFailure,
        diagnostics: impl Into<String>,
    ) -> Self {
        Error::ExternalTool {
            tool: tool.into(),
            failure,
            diagnostics: diagnostics.into(),
        }
    }

    /// The external tool's diagnostic output, empty for other kinds.
    pub fn diagnostics(&self) -> &str {
        match self {
            Error::ExternalTool { diagnostics, .. } => diagnostics,
            _ => "",
        }
    }
}
