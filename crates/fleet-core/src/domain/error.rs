//! Error taxonomy for fleet builds.

use fleet_exec::ExecError;
use fleet_state::StorageError;

/// Fleet domain errors.
///
/// Everything except [`FleetError::Publish`] aborts the run. Publish errors
/// are folded into the run report by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    // planning
    #[error("invalid increment {0:?} (expected major, minor or patch)")]
    InvalidIncrement(String),

    #[error("configuration error: {0}")]
    Config(String),

    // pipeline
    #[error("{stage} failed for {service}:\n{output}")]
    Pipeline {
        service: String,
        stage: String,
        output: String,
    },

    #[error("{program} is required to build {service} but is not installed")]
    ToolMissing { service: String, program: String },

    // install
    #[error("install failed for {service}:\n{output}")]
    Install { service: String, output: String },

    // git
    #[error("git failed for {service}:\n{output}")]
    Git { service: String, output: String },

    #[error("tag {tag} for {service} already points at {existing}, not HEAD {head}")]
    TagConflict {
        service: String,
        tag: String,
        existing: String,
        head: String,
    },

    // distribution
    #[error("publish failed: {0}")]
    Publish(String),

    #[error("build cancelled")]
    Cancelled,

    #[error("lease error: {0}")]
    Lease(String),

    #[error("exec error: {0}")]
    Exec(#[from] ExecError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FleetError {
    /// Service the failure belongs to, when there is one.
    pub fn service(&self) -> Option<&str> {
        match self {
            FleetError::Pipeline { service, .. }
            | FleetError::ToolMissing { service, .. }
            | FleetError::Install { service, .. }
            | FleetError::Git { service, .. }
            | FleetError::TagConflict { service, .. } => Some(service),
            _ => None,
        }
    }
}

/// Result type for fleet domain operations.
pub type Result<T> = std::result::Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_carries_output() {
        let err = FleetError::Pipeline {
            service: "gateway".to_string(),
            stage: "lint".to_string(),
            output: "main.go:12: unused variable".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("lint failed for gateway"));
        assert!(msg.contains("unused variable"));
        assert_eq!(err.service(), Some("gateway"));
    }

    #[test]
    fn test_tag_conflict_display() {
        let err = FleetError::TagConflict {
            service: "api".to_string(),
            tag: "1.3.0".to_string(),
            existing: "abc1234".to_string(),
            head: "def5678".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("1.3.0"));
        assert!(msg.contains("abc1234"));
        assert!(msg.contains("def5678"));
    }

    #[test]
    fn test_exec_error_converts() {
        let err: FleetError = ExecError::ToolNotFound {
            program: "go".to_string(),
        }
        .into();
        assert!(matches!(err, FleetError::Exec(_)));
        assert_eq!(err.service(), None);
    }
}
