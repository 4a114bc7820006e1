//! Error types for fleet-exec

use thiserror::Error;

/// Errors that can occur while driving external tools
#[derive(Error, Debug)]
pub enum ExecError {
    /// Program is not installed or not in PATH
    #[error("{program} is not installed or not in PATH")]
    ToolNotFound { program: String },

    /// Program could not be started
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Program ran past its timeout and was killed
    #[error("{command} timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },

    /// Command line was empty
    #[error("empty command")]
    EmptyCommand,

    /// HTTP error (model endpoint, webhook)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Collaborator answered with something unusable
    #[error("unexpected response: {0}")]
    BadResponse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ExecError {
    fn from(err: reqwest::Error) -> Self {
        ExecError::Http(err.to_string())
    }
}

impl ExecError {
    /// Whether the failure means the tool is simply not available.
    pub fn is_tool_missing(&self) -> bool {
        matches!(self, ExecError::ToolNotFound { .. })
    }
}
