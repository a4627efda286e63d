//! Engine facade: the Think-on-Graph reasoning entry point.
//!
//! `ToGEngine` is bound to one partition and wires the collaborators
//! (graph store, chat model, optional dense retriever, prompt templates,
//! path scorer) into a single call:
//!
//! question → topic extraction → linking → beam search → answer.
//!
//! `reason()` never fails: every error, and any panic inside the pipeline,
//! becomes a `ReasonResult` with `success = false`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::beam::{BeamSearch, Expander, GenerationOrder, PathScorer, ReasoningPath, StopReason};
use crate::error::{EngineError, ToGError, ToGResult};
use crate::graph::GraphStore;
use crate::graph::neighborhood::{DEFAULT_NEIGHBOR_LIMIT, NeighborhoodProvider};
use crate::link::{DEFAULT_LINK_THRESHOLD, DenseRetriever, EntityLinker};
use crate::llm::prompts::{PromptKind, PromptTemplates};
use crate::llm::{ChatClient, LlmError};
use crate::oracle::{AnswerSynthesizer, INSUFFICIENT_ANSWER, SufficiencyOracle, has_evidence};
use crate::partition::PartitionKey;
use crate::prune::{DEFAULT_CANDIDATE_CAP, Pruner, split_list};

/// Tuning knobs for the reasoning engine (the `[engine]` config section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Depth used by [`ToGEngine::reason_default`].
    pub default_max_depth: usize,
    /// Beam width used by [`ToGEngine::reason_default`].
    pub default_max_width: usize,
    /// Maximum dense distance at which a mention is linked.
    pub linking_threshold: f32,
    /// Candidates shown to the model per pruning call.
    pub candidate_cap: usize,
    /// Neighbors fetched per entity.
    pub neighbor_limit: usize,
    /// Let paths revisit entities they already contain.
    pub allow_cycles: bool,
    pub answer_temperature: f32,
    /// Temperature for extraction, pruning and sufficiency calls.
    pub selection_temperature: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_depth: 3,
            default_max_width: 3,
            linking_threshold: DEFAULT_LINK_THRESHOLD,
            candidate_cap: DEFAULT_CANDIDATE_CAP,
            neighbor_limit: DEFAULT_NEIGHBOR_LIMIT,
            allow_cycles: false,
            answer_temperature: 0.1,
            selection_temperature: 0.0,
        }
    }
}

/// Outcome of one `reason()` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonResult {
    pub success: bool,
    pub question: String,
    pub answer: String,
    /// Wall-clock seconds.
    pub execution_time: f64,
    pub error: Option<String>,
    /// Final beam.
    pub paths: Vec<ReasoningPath>,
    /// Search depth reached.
    pub depth: usize,
    pub stop: Option<StopReason>,
}

impl ReasonResult {
    fn failed(question: &str, message: String, execution_time: f64) -> Self {
        Self {
            success: false,
            question: question.to_string(),
            answer: format!("Reasoning failed: {message}"),
            execution_time,
            error: Some(message),
            paths: Vec::new(),
            depth: 0,
            stop: None,
        }
    }
}

struct Reasoned {
    success: bool,
    answer: String,
    paths: Vec<ReasoningPath>,
    depth: usize,
    stop: StopReason,
}

/// Think-on-Graph reasoning over one partition.
pub struct ToGEngine {
    config: EngineConfig,
    partition: PartitionKey,
    store: Arc<dyn GraphStore>,
    chat: Arc<dyn ChatClient>,
    retriever: Option<Arc<dyn DenseRetriever>>,
    prompts: Arc<PromptTemplates>,
    scorer: Arc<dyn PathScorer>,
}

impl ToGEngine {
    pub fn new(
        config: EngineConfig,
        partition: PartitionKey,
        store: Arc<dyn GraphStore>,
        chat: Arc<dyn ChatClient>,
    ) -> Self {
        Self {
            config,
            partition,
            store,
            chat,
            retriever: None,
            prompts: Arc::new(PromptTemplates::default()),
            scorer: Arc::new(GenerationOrder),
        }
    }

    /// Link mentions through a dense index instead of lexical matching only.
    pub fn with_retriever(mut self, retriever: Arc<dyn DenseRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn PathScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    /// Entity linker for this engine's partition and retriever.
    pub fn linker(&self) -> EntityLinker {
        let linker = EntityLinker::new(Arc::clone(&self.store), self.partition.clone());
        match &self.retriever {
            Some(r) => linker.with_retriever(Arc::clone(r)),
            None => linker,
        }
    }

    pub fn neighborhood(&self) -> NeighborhoodProvider {
        NeighborhoodProvider::new(Arc::clone(&self.store)).with_limit(self.config.neighbor_limit)
    }

    /// Answer `question` with the configured default depth and width.
    pub fn reason_default(&self, question: &str) -> ReasonResult {
        self.reason(
            question,
            self.config.default_max_depth,
            self.config.default_max_width,
        )
    }

    /// Answer `question` by beam search of at most `max_depth` hops over a
    /// beam of `max_width` paths.
    pub fn reason(&self, question: &str, max_depth: usize, max_width: usize) -> ReasonResult {
        let start = Instant::now();
        tracing::info!(
            partition = %self.partition,
            max_depth,
            max_width,
            question,
            "reasoning started"
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run(question, max_depth, max_width)
        }));
        let execution_time = start.elapsed().as_secs_f64();

        let error = match outcome {
            Ok(Ok(done)) => {
                tracing::info!(
                    partition = %self.partition,
                    success = done.success,
                    depth = done.depth,
                    paths = done.paths.len(),
                    stop = ?done.stop,
                    execution_time,
                    "reasoning finished"
                );
                return ReasonResult {
                    success: done.success,
                    question: question.to_string(),
                    answer: done.answer,
                    execution_time,
                    error: None,
                    paths: done.paths,
                    depth: done.depth,
                    stop: Some(done.stop),
                };
            }
            Ok(Err(e)) => e,
            Err(payload) => ToGError::from(EngineError::Aborted {
                message: panic_message(payload.as_ref()),
            }),
        };

        tracing::error!(partition = %self.partition, error = %error, "reasoning failed");
        ReasonResult::failed(question, error.to_string(), execution_time)
    }

    fn run(&self, question: &str, max_depth: usize, max_width: usize) -> ToGResult<Reasoned> {
        if max_width == 0 {
            return Err(EngineError::InvalidArgument {
                message: "max_width must be at least 1".into(),
            }
            .into());
        }
        if question.trim().is_empty() {
            return Err(EngineError::InvalidArgument {
                message: "question is blank".into(),
            }
            .into());
        }

        let mentions = self.extract_mentions(question)?;
        let mut topics = self.linker().link(&mentions, self.config.linking_threshold);
        topics.truncate(max_width);
        tracing::info!(mentions = ?mentions, topics = ?topics, "topic entities");

        let outcome = self.beam_search().run(question, &topics, max_depth, max_width);

        if !has_evidence(&outcome.paths) {
            tracing::warn!(stop = ?outcome.stop, "no relational evidence found");
            return Ok(Reasoned {
                success: false,
                answer: INSUFFICIENT_ANSWER.to_string(),
                paths: outcome.paths,
                depth: outcome.depth,
                stop: outcome.stop,
            });
        }

        let answer = AnswerSynthesizer::new(Arc::clone(&self.chat), Arc::clone(&self.prompts))
            .with_temperature(self.config.answer_temperature)
            .synthesize(question, &outcome.paths)?;
        Ok(Reasoned {
            success: true,
            answer,
            paths: outcome.paths,
            depth: outcome.depth,
            stop: outcome.stop,
        })
    }

    /// Ask the model for the entity mentions in `question`.
    pub fn extract_mentions(&self, question: &str) -> Result<Vec<String>, LlmError> {
        let prompt = self
            .prompts
            .render(PromptKind::EntityExtraction, &[("question", question)]);
        let response = self
            .chat
            .complete(&prompt, self.config.selection_temperature)?;
        Ok(split_list(&response))
    }

    fn beam_search(&self) -> BeamSearch {
        let pruner = Pruner::new(Arc::clone(&self.chat), Arc::clone(&self.prompts))
            .with_candidate_cap(self.config.candidate_cap)
            .with_temperature(self.config.selection_temperature);
        let expander = Expander::new(self.neighborhood(), pruner, self.partition.clone())
            .with_allow_cycles(self.config.allow_cycles);
        let oracle = SufficiencyOracle::new(Arc::clone(&self.chat), Arc::clone(&self.prompts))
            .with_temperature(self.config.selection_temperature);
        BeamSearch::new(expander, oracle).with_scorer(Arc::clone(&self.scorer))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic in reasoning pipeline".to_string()
    }
}

impl std::fmt::Debug for ToGEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToGEngine")
            .field("partition", &self.partition)
            .field("config", &self.config)
            .field("retriever", &self.retriever.is_some())
            .finish()
    }
}
