//! Deterministic [`ChatClient`] with canned responses.
//!
//! Rules are matched in insertion order against the prompt text; the first
//! rule whose needle occurs in the prompt decides the reply. Every call is
//! recorded so tests can assert how many LLM round-trips happened.

use std::sync::Mutex;

use super::{ChatClient, LlmError};

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

/// A scripted chat client.
#[derive(Debug, Default)]
pub struct ScriptedChat {
    rules: Vec<(String, Reply)>,
    fallback: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `response` when the prompt contains `needle`.
    pub fn on(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules
            .push((needle.into(), Reply::Text(response.into())));
        self
    }

    /// Fail with a request error when the prompt contains `needle`.
    pub fn fail_on(mut self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules
            .push((needle.into(), Reply::Fail(message.into())));
        self
    }

    /// Reply for prompts no rule matches. Without one, unmatched prompts fail.
    pub fn otherwise(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// Number of `complete` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Number of calls whose prompt contained `needle`.
    pub fn calls_containing(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|p| p.contains(needle)).count())
            .unwrap_or(0)
    }

    /// All prompts seen so far.
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ChatClient for ScriptedChat {
    fn complete(&self, prompt: &str, _temperature: f32) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(prompt.to_string());
        }
        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone());
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(message)) => Err(LlmError::RequestFailed { message }),
            None => self.fallback.clone().ok_or_else(|| LlmError::RequestFailed {
                message: "no scripted response for prompt".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_rule_wins() {
        let chat = ScriptedChat::new()
            .on("relations", "a, b")
            .on("rel", "never")
            .otherwise("default");
        assert_eq!(chat.complete("pick relations", 0.0).unwrap(), "a, b");
        assert_eq!(chat.complete("something else", 0.0).unwrap(), "default");
        assert_eq!(chat.call_count(), 2);
        assert_eq!(chat.calls_containing("relations"), 1);
    }

    #[test]
    fn unmatched_without_fallback_fails() {
        let chat = ScriptedChat::new().fail_on("boom", "scripted failure");
        assert!(chat.complete("boom", 0.0).is_err());
        assert!(chat.complete("quiet", 0.0).is_err());
    }
}
