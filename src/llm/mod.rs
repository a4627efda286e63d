//! Language-model access for pruning, sufficiency checks and answers.
//!
//! The engine only needs two narrow capabilities:
//! - [`ChatClient`]: `complete(prompt, temperature) -> text`
//! - [`Embedder`]: `embed(text) -> vector` for the dense name index
//!
//! [`OllamaClient`] implements both against the Ollama REST API with a
//! blocking `ureq` agent. [`ScriptedChat`] returns canned responses so the
//! reasoning loop can be exercised deterministically.

pub mod prompts;
pub mod scripted;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use scripted::ScriptedChat;

/// Errors from the LLM subsystem.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("LLM server is not reachable at {url}")]
    #[diagnostic(
        code(tog::llm::unavailable),
        help("Start Ollama with `ollama serve` or point `llm.base_url` at a running server.")
    )]
    Unavailable { url: String },

    #[error("LLM request failed: {message}")]
    #[diagnostic(
        code(tog::llm::request_failed),
        help("Check that the server is running and the model is pulled.")
    )]
    RequestFailed { message: String },

    #[error("failed to parse LLM response: {message}")]
    #[diagnostic(
        code(tog::llm::parse_error),
        help("The model server returned an unexpected response format.")
    )]
    ParseError { message: String },
}

/// Synchronous text completion.
pub trait ChatClient: Send + Sync {
    fn complete(&self, prompt: &str, temperature: f32) -> Result<String, LlmError>;
}

/// Text embedding for dense retrieval.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// Configuration for the Ollama client (the `[llm]` config section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    pub base_url: String,
    /// Model used for completions.
    pub model: String,
    /// Model used for embeddings.
    pub embedding_model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "qwen3:8b".into(),
            embedding_model: "nomic-embed-text".into(),
            timeout_secs: 120,
        }
    }
}

/// Client for the Ollama REST API.
pub struct OllamaClient {
    config: OllamaConfig,
    agent: ureq::Agent,
}

impl OllamaClient {
    /// Create a new Ollama client with the given configuration.
    pub fn new(config: OllamaConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build();
        Self { config, agent }
    }

    /// Check that the server answers and lists the configured model.
    pub fn probe(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_secs(5))
            .build();

        let Ok(resp) = agent.get(&url).call() else {
            return false;
        };
        let Ok(body) = resp.into_string() else {
            return false;
        };
        let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) else {
            return false;
        };
        let target = &self.config.model;
        json["models"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["name"].as_str())
                    .any(|m| m == target || m.split(':').next() == Some(target.as_str()))
            })
            .unwrap_or(false)
    }

    fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
        let url = format!("{}{path}", self.config.base_url);
        let body_str = serde_json::to_string(body).map_err(|e| LlmError::RequestFailed {
            message: format!("JSON serialize error: {e}"),
        })?;

        let resp = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body_str)
            .map_err(|e| self.map_transport(e))?;

        let resp_str = resp.into_string().map_err(|e| LlmError::ParseError {
            message: e.to_string(),
        })?;

        serde_json::from_str(&resp_str).map_err(|e| LlmError::ParseError {
            message: e.to_string(),
        })
    }

    fn map_transport(&self, e: ureq::Error) -> LlmError {
        match e {
            ureq::Error::Transport(t)
                if matches!(
                    t.kind(),
                    ureq::ErrorKind::ConnectionFailed | ureq::ErrorKind::Dns
                ) =>
            {
                LlmError::Unavailable {
                    url: self.config.base_url.clone(),
                }
            }
            other => LlmError::RequestFailed {
                message: other.to_string(),
            },
        }
    }

    /// Get the completion model name.
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

impl ChatClient for OllamaClient {
    fn complete(&self, prompt: &str, temperature: f32) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": temperature },
        });
        let json = self.post_json("/api/generate", &body)?;
        json["response"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| LlmError::ParseError {
                message: "missing 'response' field".into(),
            })
    }
}

impl Embedder for OllamaClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = serde_json::json!({
            "model": self.config.embedding_model,
            "prompt": text,
        });
        let json = self.post_json("/api/embeddings", &body)?;
        let values = json["embedding"]
            .as_array()
            .ok_or_else(|| LlmError::ParseError {
                message: "missing 'embedding' field".into(),
            })?;
        values
            .iter()
            .map(|v| {
                v.as_f64().map(|f| f as f32).ok_or_else(|| LlmError::ParseError {
                    message: "non-numeric embedding component".into(),
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("embedding_model", &self.config.embedding_model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable() -> OllamaClient {
        OllamaClient::new(OllamaConfig {
            base_url: "http://127.0.0.1:1".into(), // unreachable port
            timeout_secs: 2,
            ..Default::default()
        })
    }

    #[test]
    fn probe_unreachable_returns_false() {
        assert!(!unreachable().probe());
    }

    #[test]
    fn complete_when_unreachable_returns_error() {
        assert!(unreachable().complete("test", 0.0).is_err());
    }

    #[test]
    fn embed_when_unreachable_returns_error() {
        assert!(unreachable().embed("test").is_err());
    }

    #[test]
    fn default_config_values() {
        let config = OllamaConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.model, "qwen3:8b");
        assert_eq!(config.timeout_secs, 120);
    }
}
