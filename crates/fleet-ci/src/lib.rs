//! Fleet CI - the per-service build pipeline
//!
//! Provides the [`fleet_core::PipelineRunner`] used by `fleet build`:
//! - Stops the running instance
//! - Runs tidy, format, lint, test and compile for the service's toolchain
//! - Stamps the long version into the compile step
//! - Measures the artifact the compile step left behind

pub mod pipeline;
pub mod runner;
pub mod stage;

// Re-export key types
pub use pipeline::BuildPipelineRunner;
pub use runner::{StageResult, StageRunner};
pub use stage::{stages_for, BuiltinStage, StageConfig, VERSION_ENV};
