//! Commit message generation via a local model.
//!
//! Talks to an Ollama-compatible endpoint (`POST /api/generate`). Callers
//! treat every error as "use the generic message"; nothing here is fatal.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ExecError, Result};

/// Largest diff excerpt sent to the model, in bytes.
const MAX_DIFF_BYTES: usize = 8 * 1024;

/// Capability to summarise a staged diff into a commit message.
#[async_trait]
pub trait MessageGenerator: Send + Sync {
    async fn commit_message(&self, service: &str, diff: &str) -> Result<String>;
}

/// Local model endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL, e.g. `http://127.0.0.1:11434`
    pub url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            url: "http://127.0.0.1:11434".to_string(),
            model: "qwen2.5-coder:7b".to_string(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Ollama `/api/generate` client.
pub struct OllamaMessageGenerator {
    config: LlmConfig,
    http_client: reqwest::Client,
}

impl OllamaMessageGenerator {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("fleet-exec/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(OllamaMessageGenerator {
            config,
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.config.url.trim_end_matches('/'))
    }
}

/// Prompt for a one-line conventional commit summary of `diff`.
pub(crate) fn build_prompt(service: &str, diff: &str) -> String {
    let mut cut = diff.len().min(MAX_DIFF_BYTES);
    while !diff.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "Write a single-line git commit message (max 72 characters, imperative mood) \
         for the following changes to the `{service}` service. \
         Reply with the message only.\n\n{}",
        &diff[..cut]
    )
}

/// First non-empty line of a model reply, stripped of quotes.
pub(crate) fn clean_reply(reply: &str) -> Option<String> {
    let line = reply.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_matches(|c| c == '"' || c == '`' || c == '\'').trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

#[async_trait]
impl MessageGenerator for OllamaMessageGenerator {
    async fn commit_message(&self, service: &str, diff: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt: build_prompt(service, diff),
            stream: false,
        };
        debug!(endpoint = %self.endpoint(), model = %self.config.model, "requesting commit message");

        let response = self
            .http_client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ExecError::Http(format!(
                "model endpoint returned {}",
                response.status()
            )));
        }
        let body: GenerateResponse = response.json().await?;
        clean_reply(&body.response)
            .ok_or_else(|| ExecError::BadResponse("empty model reply".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_truncates_on_char_boundary() {
        let diff = "aé".repeat(MAX_DIFF_BYTES);
        let prompt = build_prompt("gateway", &diff);
        assert!(prompt.contains("`gateway`"));
        assert!(prompt.len() < MAX_DIFF_BYTES + 300);
    }

    #[test]
    fn test_clean_reply() {
        assert_eq!(
            clean_reply("\n  \"fix: handle empty config\"\nmore text").as_deref(),
            Some("fix: handle empty config")
        );
        assert_eq!(clean_reply("   \n\n"), None);
        assert_eq!(clean_reply("``"), None);
    }

    #[test]
    fn test_endpoint_joins_path() {
        let generator = OllamaMessageGenerator::new(LlmConfig {
            url: "http://127.0.0.1:11434/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(generator.endpoint(), "http://127.0.0.1:11434/api/generate");
    }

    #[test]
    fn test_config_deserialize_partial() {
        let cfg: LlmConfig = serde_json::from_str(r#"{"model":"llama3"}"#).unwrap();
        assert_eq!(cfg.model, "llama3");
        assert_eq!(cfg.timeout_secs, 20);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_error() {
        let generator = OllamaMessageGenerator::new(LlmConfig {
            url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();
        assert!(generator.commit_message("gateway", "diff").await.is_err());
    }
}
