//! LLM judgements over the current beam: sufficiency and the final answer.

use std::sync::Arc;

use crate::beam::ReasoningPath;
use crate::llm::prompts::{PromptKind, PromptTemplates};
use crate::llm::{ChatClient, LlmError};

/// Answer returned when no relational evidence was found.
pub const INSUFFICIENT_ANSWER: &str =
    "Insufficient information: the knowledge graph does not contain enough evidence to answer this question.";

/// Render a beam as `Path i: (s) --[r]--> (t) -> ...` lines.
///
/// Bare paths are skipped; numbering follows beam position.
pub fn format_paths(paths: &[ReasoningPath]) -> String {
    paths
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_bare())
        .map(|(i, p)| format!("Path {}: {p}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// True when at least one path has a relational hop.
pub fn has_evidence(paths: &[ReasoningPath]) -> bool {
    paths.iter().any(|p| !p.is_bare())
}

/// Yes/no judge: can the question be answered from these paths?
#[derive(Clone)]
pub struct SufficiencyOracle {
    chat: Arc<dyn ChatClient>,
    prompts: Arc<PromptTemplates>,
    temperature: f32,
}

impl SufficiencyOracle {
    pub fn new(chat: Arc<dyn ChatClient>, prompts: Arc<PromptTemplates>) -> Self {
        Self {
            chat,
            prompts,
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Never calls the model for a beam without evidence. Model errors read
    /// as "not yet".
    pub fn is_sufficient(&self, question: &str, paths: &[ReasoningPath]) -> bool {
        if !has_evidence(paths) {
            return false;
        }
        let prompt = self.prompts.render(
            PromptKind::ReasoningEvaluation,
            &[("question", question), ("paths", &format_paths(paths))],
        );
        match self.chat.complete(&prompt, self.temperature) {
            Ok(response) => {
                let sufficient = response.to_lowercase().contains("yes");
                tracing::debug!(sufficient, paths = paths.len(), "sufficiency judged");
                sufficient
            }
            Err(e) => {
                tracing::warn!(error = %e, "sufficiency check failed, continuing search");
                false
            }
        }
    }
}

/// Produces the final answer text from the beam.
#[derive(Clone)]
pub struct AnswerSynthesizer {
    chat: Arc<dyn ChatClient>,
    prompts: Arc<PromptTemplates>,
    temperature: f32,
}

impl AnswerSynthesizer {
    pub fn new(chat: Arc<dyn ChatClient>, prompts: Arc<PromptTemplates>) -> Self {
        Self {
            chat,
            prompts,
            temperature: 0.1,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// The model's reply, verbatim.
    pub fn synthesize(&self, question: &str, paths: &[ReasoningPath]) -> Result<String, LlmError> {
        let prompt = self.prompts.render(
            PromptKind::AnswerGeneration,
            &[("question", question), ("paths", &format_paths(paths))],
        );
        self.chat.complete(&prompt, self.temperature)
    }
}

impl std::fmt::Debug for SufficiencyOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SufficiencyOracle")
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl std::fmt::Debug for AnswerSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerSynthesizer")
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedChat;

    fn prompts() -> Arc<PromptTemplates> {
        Arc::new(PromptTemplates::default())
    }

    fn chain() -> ReasoningPath {
        ReasoningPath::seed("A")
            .extend("part_of", "B")
            .extend("located_in", "C")
    }

    #[test]
    fn formats_relational_paths_only() {
        let text = format_paths(&[ReasoningPath::seed("X"), chain()]);
        assert_eq!(
            text,
            "Path 2: (A) --[part_of]--> (B) -> (B) --[located_in]--> (C)"
        );
    }

    #[test]
    fn bare_beam_skips_the_model() {
        let chat = Arc::new(ScriptedChat::new().otherwise("Yes"));
        let oracle = SufficiencyOracle::new(chat.clone(), prompts());
        assert!(!oracle.is_sufficient("q", &[]));
        assert!(!oracle.is_sufficient("q", &[ReasoningPath::seed("A")]));
        assert_eq!(chat.call_count(), 0);
    }

    #[test]
    fn yes_anywhere_means_sufficient() {
        let chat = Arc::new(ScriptedChat::new().otherwise("YES, that is enough."));
        let oracle = SufficiencyOracle::new(chat, prompts());
        assert!(oracle.is_sufficient("q", &[chain()]));

        let chat = Arc::new(ScriptedChat::new().otherwise("No."));
        let oracle = SufficiencyOracle::new(chat, prompts());
        assert!(!oracle.is_sufficient("q", &[chain()]));
    }

    #[test]
    fn model_error_is_not_sufficient() {
        let chat = Arc::new(ScriptedChat::new().fail_on("Answer with only", "down"));
        let oracle = SufficiencyOracle::new(chat, prompts());
        assert!(!oracle.is_sufficient("q", &[chain()]));
    }

    #[test]
    fn synthesized_text_is_verbatim() {
        let chat = Arc::new(ScriptedChat::new().on("Knowledge paths", "1. **C**\n"));
        let synth = AnswerSynthesizer::new(chat.clone(), prompts());
        assert_eq!(synth.synthesize("Where?", &[chain()]).unwrap(), "1. **C**\n");
        assert!(chat.prompts()[0].contains("(B) --[located_in]--> (C)"));
    }

    #[test]
    fn synthesis_error_propagates() {
        let chat = Arc::new(ScriptedChat::new());
        let synth = AnswerSynthesizer::new(chat, prompts());
        assert!(synth.synthesize("q", &[chain()]).is_err());
    }
}
