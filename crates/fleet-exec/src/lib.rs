//! Fleet-Exec: the orchestrator's hands
//!
//! Every side effect the orchestrator has on the outside world goes through
//! this crate, behind a trait so tests can swap in a recording fake:
//!
//! - [`CommandRunner`]: git, compilers, linters, `systemctl`
//! - [`MessageGenerator`]: commit messages from a local model
//! - [`Notifier`]: alerts for downstream monitoring
//!
//! ## Layer 1 - Tooling
//!
//! Focus: faithful capture of exit codes and output, and short explicit
//! timeouts on every network call.

mod error;
pub mod fakes;
mod llm;
mod notify;
mod runner;

pub use error::ExecError;
pub use llm::{LlmConfig, MessageGenerator, OllamaMessageGenerator};
pub use notify::{LogNotifier, Notification, Notifier, Priority, WebhookNotifier};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};

/// Result type for fleet-exec operations
pub type Result<T> = std::result::Result<T, ExecError>;
