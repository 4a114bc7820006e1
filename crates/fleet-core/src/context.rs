//! Per-invocation run context.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::domain::error::{FleetError, Result};

/// State shared by every phase of one `fleet` invocation.
///
/// Built once in `main` and passed down by reference.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    /// Version of the running `fleet` binary.
    pub cli_version: String,
    pub started_at: DateTime<Utc>,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(cli_version: impl Into<String>) -> Self {
        Self::with_cancel(cli_version, CancellationToken::new())
    }

    pub fn with_cancel(cli_version: impl Into<String>, cancel: CancellationToken) -> Self {
        RunContext {
            run_id: uuid::Uuid::new_v4().to_string(),
            cli_version: cli_version.into(),
            started_at: Utc::now(),
            cancel,
        }
    }

    /// `Err(Cancelled)` once the token has fired.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(FleetError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_cancelled() {
        let ctx = RunContext::new("0.4.0");
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancel.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(FleetError::Cancelled)));
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunContext::new("0.4.0").run_id, RunContext::new("0.4.0").run_id);
    }
}
