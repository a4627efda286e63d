//! Prompt templates, injectable per deployment.
//!
//! Each LLM operation of the reasoning loop has one template, keyed by
//! [`PromptKind`]. Templates use `{name}` placeholders that are substituted
//! in a single pass, so values containing braces are never re-expanded.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

static RE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern is valid"));

/// The LLM operations that take a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Pull entity mentions out of the question. Vars: `question`.
    EntityExtraction,
    /// Choose relations to follow. Vars: `question`, `entities`, `relations`, `beam_width`.
    RelationSelection,
    /// Choose target entities. Vars: `question`, `relation`, `entities`, `beam_width`.
    EntitySelection,
    /// Yes/no sufficiency judgement. Vars: `question`, `paths`.
    ReasoningEvaluation,
    /// Final answer. Vars: `question`, `paths`.
    AnswerGeneration,
}

impl PromptKind {
    pub const ALL: [PromptKind; 5] = [
        Self::EntityExtraction,
        Self::RelationSelection,
        Self::EntitySelection,
        Self::ReasoningEvaluation,
        Self::AnswerGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntityExtraction => "entity_extraction",
            Self::RelationSelection => "relation_selection",
            Self::EntitySelection => "entity_selection",
            Self::ReasoningEvaluation => "reasoning_evaluation",
            Self::AnswerGeneration => "answer_generation",
        }
    }

    fn default_template(&self) -> &'static str {
        match self {
            Self::EntityExtraction => {
                "Given the question: \"{question}\"\n\
                 Please extract all key entities mentioned in this question.\n\
                 Return only the entity names, separated by commas.\n\
                 Entities:"
            }
            Self::RelationSelection => {
                "Given the question: \"{question}\"\n\
                 Current entities: {entities}\n\
                 Available relations: {relations}\n\n\
                 Please select the top {beam_width} most relevant relations that help answer the question.\n\
                 Return only the relation names, separated by commas.\n\
                 Selected relations:"
            }
            Self::EntitySelection => {
                "Given the question: \"{question}\"\n\
                 Current relation: {relation}\n\
                 Available entities: {entities}\n\n\
                 Please select the top {beam_width} most relevant entities that help answer the question.\n\
                 Return only the entity names, separated by commas.\n\
                 Selected entities:"
            }
            Self::ReasoningEvaluation => {
                "Given the question: \"{question}\"\n\
                 Retrieved knowledge paths:\n\
                 {paths}\n\n\
                 Can you answer the question with sufficient confidence based on these paths and your knowledge?\n\
                 Answer with only \"Yes\" or \"No\".\n\
                 Answer:"
            }
            Self::AnswerGeneration => {
                "Based on the question and retrieved knowledge paths, please provide a clear, \
                 Markdown-formatted answer.\n\n\
                 Requirements:\n\
                 1. Use Markdown syntax for readability (**bold** key terms, `code` for entities).\n\
                 2. Organize the answer as a numbered list (1. 2. 3. ...).\n\
                 3. Start each point on a new line.\n\
                 4. Keep the response concise and structured.\n\n\
                 Question: {question}\n\
                 Knowledge paths:\n\
                 {paths}\n\n\
                 Answer:"
            }
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The full set of templates the engine formats at runtime.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    templates: HashMap<PromptKind, String>,
}

impl PromptTemplates {
    /// Templates with the given overrides applied on top of the defaults.
    pub fn with_overrides(overrides: &BTreeMap<PromptKind, String>) -> Self {
        let mut templates = Self::default();
        for (kind, template) in overrides {
            templates.set(*kind, template.clone());
        }
        templates
    }

    pub fn set(&mut self, kind: PromptKind, template: impl Into<String>) {
        self.templates.insert(kind, template.into());
    }

    pub fn get(&self, kind: PromptKind) -> &str {
        self.templates
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_template())
    }

    /// Substitute `{name}` placeholders. Unknown placeholders stay verbatim.
    pub fn render(&self, kind: PromptKind, vars: &[(&str, &str)]) -> String {
        RE_PLACEHOLDER.replace_all(self.get(kind), |caps: &Captures| {
            let name = &caps[1];
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
    }
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            templates: PromptKind::ALL
                .iter()
                .map(|k| (*k, k.default_template().to_string()))
                .collect(),
        }
    }
}
