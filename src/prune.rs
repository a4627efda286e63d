//! LLM-backed top-k selection of relations and entities.
//!
//! When the candidate list already fits in `k` no prompt is sent. Otherwise
//! the model sees at most `candidate_cap` candidates and replies with a
//! comma-separated list; only tokens that name a shown candidate survive.
//! An unusable reply falls back to the first `k` candidates.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::graph::memory::normalize;
use crate::llm::ChatClient;
use crate::llm::prompts::{PromptKind, PromptTemplates};

static RE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,，、;\n]").expect("separator pattern is valid"));

static RE_LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*•]|\d+[.)、])\s*").expect("marker pattern is valid")
});

/// Default number of candidates shown to the model.
pub const DEFAULT_CANDIDATE_CAP: usize = 20;

/// Top-k selector shared by relation and entity pruning.
#[derive(Clone)]
pub struct Pruner {
    chat: Arc<dyn ChatClient>,
    prompts: Arc<PromptTemplates>,
    candidate_cap: usize,
    temperature: f32,
}

impl Pruner {
    pub fn new(chat: Arc<dyn ChatClient>, prompts: Arc<PromptTemplates>) -> Self {
        Self {
            chat,
            prompts,
            candidate_cap: DEFAULT_CANDIDATE_CAP,
            temperature: 0.0,
        }
    }

    pub fn with_candidate_cap(mut self, cap: usize) -> Self {
        self.candidate_cap = cap.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Relations of `entity` most likely to help answer `question`.
    pub fn select_relations(
        &self,
        question: &str,
        entity: &str,
        candidates: &[String],
        k: usize,
    ) -> Vec<String> {
        self.select(candidates, k, |shown| {
            self.prompts.render(
                PromptKind::RelationSelection,
                &[
                    ("question", question),
                    ("entities", entity),
                    ("relations", &shown.join(", ")),
                    ("beam_width", &k.to_string()),
                ],
            )
        })
    }

    /// Targets of `relation` most likely to help answer `question`.
    pub fn select_entities(
        &self,
        question: &str,
        relation: &str,
        candidates: &[String],
        k: usize,
    ) -> Vec<String> {
        self.select(candidates, k, |shown| {
            self.prompts.render(
                PromptKind::EntitySelection,
                &[
                    ("question", question),
                    ("relation", relation),
                    ("entities", &shown.join(", ")),
                    ("beam_width", &k.to_string()),
                ],
            )
        })
    }

    fn select<F>(&self, candidates: &[String], k: usize, prompt: F) -> Vec<String>
    where
        F: FnOnce(&[String]) -> String,
    {
        if k == 0 {
            return Vec::new();
        }
        if candidates.len() <= k {
            return candidates.to_vec();
        }

        let shown = &candidates[..candidates.len().min(self.candidate_cap)];
        let picked = match self.chat.complete(&prompt(shown), self.temperature) {
            Ok(response) => match_selection(&response, shown, k),
            Err(e) => {
                tracing::warn!(error = %e, candidates = candidates.len(), k, "selection call failed");
                Vec::new()
            }
        };

        if picked.is_empty() {
            tracing::warn!(candidates = candidates.len(), k, "no usable selection, keeping first k");
            return candidates.iter().take(k).cloned().collect();
        }
        picked
    }
}

/// Split a comma-separated model reply into clean items.
///
/// Items are separated by ASCII or full-width commas, ideographic commas,
/// semicolons or newlines. List markers and surrounding quotes are stripped
/// and empty items dropped.
pub fn split_list(response: &str) -> Vec<String> {
    RE_SEPARATOR
        .split(response)
        .filter_map(|item| {
            let item = RE_LIST_MARKER.replace(item.trim(), "");
            let item = item.trim_matches(|c: char| c.is_whitespace() || "\"'`“”‘’".contains(c));
            (!item.is_empty()).then(|| item.to_string())
        })
        .collect()
}

/// Candidates named in a model reply, in reply order, at most `k`.
///
/// Matching is case-insensitive and width-insensitive; the candidate's own
/// spelling is returned.
pub fn match_selection(response: &str, candidates: &[String], k: usize) -> Vec<String> {
    let by_key: Vec<(String, &String)> = candidates.iter().map(|c| (normalize(c), c)).collect();
    let mut seen = HashSet::new();
    let mut picked = Vec::new();
    for item in split_list(response) {
        let key = normalize(&item);
        if let Some((_, canonical)) = by_key.iter().find(|(candidate, _)| *candidate == key) {
            if seen.insert(canonical.as_str()) {
                picked.push((*canonical).clone());
            }
        }
        if picked.len() == k {
            break;
        }
    }
    picked
}

impl std::fmt::Debug for Pruner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pruner")
            .field("candidate_cap", &self.candidate_cap)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedChat;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn pruner(chat: Arc<ScriptedChat>) -> Pruner {
        Pruner::new(chat, Arc::new(PromptTemplates::default()))
    }

    #[test]
    fn few_candidates_skip_the_model() {
        let chat = Arc::new(ScriptedChat::new().otherwise("x"));
        let p = pruner(chat.clone());
        let rels = strings(&["part_of", "owns"]);
        assert_eq!(p.select_relations("q", "A", &rels, 2), rels);
        assert_eq!(p.select_entities("q", "owns", &rels, 5), rels);
        assert_eq!(chat.call_count(), 0);
    }

    #[test]
    fn reply_is_matched_against_candidates() {
        let chat = Arc::new(ScriptedChat::new().on("Selected relations", "1. Located_In\n2. \"owns\", bogus"));
        let p = pruner(chat.clone());
        let rels = strings(&["part_of", "owns", "located_in", "made_by"]);
        assert_eq!(
            p.select_relations("q", "A", &rels, 2),
            vec!["located_in", "owns"]
        );
        assert_eq!(chat.call_count(), 1);
    }

    #[test]
    fn selection_is_truncated_and_deduplicated() {
        let picked = match_selection("b，B、c，a", &strings(&["a", "b", "c"]), 2);
        assert_eq!(picked, vec!["b", "c"]);
    }

    #[test]
    fn split_list_strips_markers_and_quotes() {
        assert_eq!(
            split_list("1. \"Drill Press\"\n2) Lathe\n- 'Paint Booth', ,"),
            vec!["Drill Press", "Lathe", "Paint Booth"]
        );
    }

    #[test]
    fn split_list_accepts_cjk_separators_and_markers() {
        assert_eq!(split_list("钻床，车床、喷漆间"), vec!["钻床", "车床", "喷漆间"]);
        assert_eq!(split_list("• Lathe;Mill"), vec!["Lathe", "Mill"]);
    }

    #[test]
    fn garbage_reply_falls_back_to_first_k() {
        let chat = Arc::new(ScriptedChat::new().otherwise("I cannot decide."));
        let p = pruner(chat);
        let ents = strings(&["E1", "E2", "E3", "E4"]);
        assert_eq!(p.select_entities("q", "r", &ents, 2), vec!["E1", "E2"]);
    }

    #[test]
    fn model_error_falls_back_to_first_k() {
        let chat = Arc::new(ScriptedChat::new().fail_on("Selected", "timeout"));
        let p = pruner(chat);
        let ents = strings(&["E1", "E2", "E3"]);
        assert_eq!(p.select_entities("q", "r", &ents, 1), vec!["E1"]);
    }

    #[test]
    fn prompt_shows_at_most_cap_candidates() {
        let chat = Arc::new(ScriptedChat::new().otherwise("c0"));
        let p = pruner(chat.clone()).with_candidate_cap(3);
        let cands: Vec<String> = (0..10).map(|i| format!("c{i}")).collect();
        assert_eq!(p.select_relations("q", "A", &cands, 2), vec!["c0"]);
        let prompt = &chat.prompts()[0];
        assert!(prompt.contains("c0, c1, c2"));
        assert!(!prompt.contains("c3"));
    }

    #[test]
    fn zero_k_selects_nothing() {
        let chat = Arc::new(ScriptedChat::new().otherwise("a"));
        assert!(pruner(chat).select_relations("q", "A", &strings(&["a"]), 0).is_empty());
    }
}
