//! Logging setup for the `fleet` binary.
//!
//! The fleet crates log at the requested level and every dependency at
//! `warn`. `FLEET_LOG`, then `RUST_LOG`, replaces that default with a full
//! filter directive. Logs go to stderr; stdout carries command output.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Checked before `RUST_LOG`.
pub const LOG_ENV: &str = "FLEET_LOG";

const FLEET_TARGETS: [&str; 5] = ["fleet", "fleet_core", "fleet_ci", "fleet_exec", "fleet_state"];

/// Log line encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    /// Newline-delimited JSON, one object per event.
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// `--verbose` turns on debug output for the fleet crates.
pub fn level_for(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// `warn` globally, `level` for the fleet crates.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    std::iter::once("warn".to_string())
        .chain(FLEET_TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

/// First non-blank, parseable filter from `FLEET_LOG` or `RUST_LOG`.
fn filter_from(lookup: impl Fn(&str) -> Option<String>, level: Level) -> EnvFilter {
    [LOG_ENV, "RUST_LOG"]
        .into_iter()
        .filter_map(|key| lookup(key))
        .filter(|value| !value.trim().is_empty())
        .find_map(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives(level)))
}

/// Install the global subscriber. Returns `false` when one was already set.
pub fn init_tracing(format: LogFormat, level: Level) -> bool {
    let filter = filter_from(|key| std::env::var(key).ok(), level);
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(layer.json()).try_init().is_ok(),
        LogFormat::Text => registry.with(layer).try_init().is_ok(),
    }
}
