//! Beam search over reasoning paths.
//!
//! A [`ReasoningPath`] starts at a bare topic entity and grows one relational
//! hop per iteration. [`Expander::expand`] is the pure step: it maps a beam to
//! the next generation of paths without touching the input. [`BeamSearch`]
//! drives the `Init → Expanding → Evaluating → … → Answering` loop and stops
//! on sufficiency, the depth limit, or an exhausted frontier.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::graph::neighborhood::{NeighborhoodProvider, distinct_relations, targets_for};
use crate::oracle::SufficiencyOracle;
use crate::partition::PartitionKey;
use crate::prune::Pruner;

/// One step of a path. The seed hop has neither source nor relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hop {
    pub source: Option<String>,
    pub relation: Option<String>,
    pub target: String,
}

/// An immutable chain of hops rooted at a topic entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReasoningPath {
    hops: Vec<Hop>,
}

impl ReasoningPath {
    /// A bare path holding only the topic entity.
    pub fn seed(entity: impl Into<String>) -> Self {
        Self {
            hops: vec![Hop {
                source: None,
                relation: None,
                target: entity.into(),
            }],
        }
    }

    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    /// Hops that carry a relation.
    pub fn relational_hops(&self) -> impl Iterator<Item = &Hop> {
        self.hops.iter().filter(|h| h.relation.is_some())
    }

    /// Number of relational hops.
    pub fn depth(&self) -> usize {
        self.relational_hops().count()
    }

    pub fn is_bare(&self) -> bool {
        self.depth() == 0
    }

    /// Entity the path currently ends at.
    pub fn tail(&self) -> &str {
        self.hops.last().map(|h| h.target.as_str()).unwrap_or_default()
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.hops.iter().any(|h| h.target == entity)
    }

    /// A new path with one more hop from the current tail.
    pub fn extend(&self, relation: impl Into<String>, target: impl Into<String>) -> Self {
        let mut hops = self.hops.clone();
        hops.push(Hop {
            source: Some(self.tail().to_string()),
            relation: Some(relation.into()),
            target: target.into(),
        });
        Self { hops }
    }
}

impl fmt::Display for ReasoningPath {
    /// `(A) --[r]--> (B) -> (B) --[s]--> (C)`, or `(A)` for a bare path.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bare() {
            return write!(f, "({})", self.tail());
        }
        let steps: Vec<String> = self
            .relational_hops()
            .map(|h| {
                format!(
                    "({}) --[{}]--> ({})",
                    h.source.as_deref().unwrap_or_default(),
                    h.relation.as_deref().unwrap_or_default(),
                    h.target
                )
            })
            .collect();
        f.write_str(&steps.join(" -> "))
    }
}

/// Ranks candidate paths before the beam is truncated. Higher is better.
pub trait PathScorer: Send + Sync {
    fn score(&self, path: &ReasoningPath) -> f32;
}

/// Constant score: the beam keeps paths in generation order.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationOrder;

impl PathScorer for GenerationOrder {
    fn score(&self, _path: &ReasoningPath) -> f32 {
        0.0
    }
}

/// Stable sort by descending score, then keep the best `width`.
pub fn rank(paths: Vec<ReasoningPath>, scorer: &dyn PathScorer, width: usize) -> Vec<ReasoningPath> {
    let mut scored: Vec<(f32, ReasoningPath)> =
        paths.into_iter().map(|p| (scorer.score(&p), p)).collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(width);
    scored.into_iter().map(|(_, p)| p).collect()
}

/// Why the search stopped expanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The oracle judged the beam sufficient.
    Sufficient,
    /// `max_depth` expansions were made.
    DepthLimit,
    /// An expansion produced no new paths.
    Exhausted,
}

/// Controller states. `Answering` is terminal for the search; the engine
/// synthesizes the answer from the final beam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Init,
    Expanding,
    Evaluating,
    Answering(StopReason),
}

/// Final beam and how the search ended.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub paths: Vec<ReasoningPath>,
    pub depth: usize,
    pub stop: StopReason,
}

/// One expansion step over a partition.
#[derive(Debug, Clone)]
pub struct Expander {
    neighborhood: NeighborhoodProvider,
    pruner: Pruner,
    partition: PartitionKey,
    allow_cycles: bool,
}

impl Expander {
    pub fn new(neighborhood: NeighborhoodProvider, pruner: Pruner, partition: PartitionKey) -> Self {
        Self {
            neighborhood,
            pruner,
            partition,
            allow_cycles: false,
        }
    }

    pub fn with_allow_cycles(mut self, allow: bool) -> Self {
        self.allow_cycles = allow;
        self
    }

    /// Extend every path by one hop.
    ///
    /// Each distinct tail is fetched and pruned once; paths sharing a tail
    /// share its selections. Output follows beam order, then relation, then
    /// target. The result is not ranked or truncated.
    pub fn expand(&self, question: &str, beam: &[ReasoningPath], width: usize) -> Vec<ReasoningPath> {
        let mut selections: HashMap<&str, Vec<(String, Vec<String>)>> = HashMap::new();
        for path in beam {
            let tail = path.tail();
            if !selections.contains_key(tail) {
                let picked = self.select_for_tail(question, tail, width);
                selections.insert(tail, picked);
            }
        }

        let mut next = Vec::new();
        for path in beam {
            let Some(picked) = selections.get(path.tail()) else {
                continue;
            };
            for (relation, targets) in picked {
                for target in targets {
                    if !self.allow_cycles && path.contains(target) {
                        continue;
                    }
                    next.push(path.extend(relation.clone(), target.clone()));
                }
            }
        }
        tracing::debug!(
            beam = beam.len(),
            tails = selections.len(),
            candidates = next.len(),
            "beam expanded"
        );
        next
    }

    fn select_for_tail(&self, question: &str, tail: &str, width: usize) -> Vec<(String, Vec<String>)> {
        let neighbors = self.neighborhood.neighbors(tail, &self.partition, 1);
        if neighbors.is_empty() {
            tracing::debug!(entity = tail, "no neighbors");
            return Vec::new();
        }
        let relations = distinct_relations(&neighbors);
        self.pruner
            .select_relations(question, tail, &relations, width)
            .into_iter()
            .map(|relation| {
                let targets = targets_for(&neighbors, &relation);
                let chosen = self.pruner.select_entities(question, &relation, &targets, width);
                tracing::trace!(entity = tail, relation = %relation, targets = ?chosen, "relation kept");
                (relation, chosen)
            })
            .filter(|(_, targets)| !targets.is_empty())
            .collect()
    }
}

/// Iterative deepening over a bounded beam.
#[derive(Clone)]
pub struct BeamSearch {
    expander: Expander,
    oracle: SufficiencyOracle,
    scorer: Arc<dyn PathScorer>,
}

impl BeamSearch {
    pub fn new(expander: Expander, oracle: SufficiencyOracle) -> Self {
        Self {
            expander,
            oracle,
            scorer: Arc::new(GenerationOrder),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn PathScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Search from the topic entities until a stop condition holds.
    ///
    /// The returned depth never exceeds `max_depth` and the beam never
    /// exceeds `width` relational paths.
    pub fn run(&self, question: &str, seeds: &[String], max_depth: usize, width: usize) -> SearchOutcome {
        let mut state = SearchState::Init;
        let mut beam: Vec<ReasoningPath> = Vec::new();
        let mut depth = 0;

        loop {
            let next = match state {
                SearchState::Init => {
                    beam = seeds.iter().map(ReasoningPath::seed).collect();
                    if beam.is_empty() {
                        SearchState::Answering(StopReason::Exhausted)
                    } else if max_depth == 0 {
                        SearchState::Answering(StopReason::DepthLimit)
                    } else {
                        SearchState::Expanding
                    }
                }
                SearchState::Expanding => {
                    let expanded = self.expander.expand(question, &beam, width);
                    if expanded.is_empty() {
                        SearchState::Answering(StopReason::Exhausted)
                    } else {
                        beam = rank(expanded, self.scorer.as_ref(), width);
                        depth += 1;
                        SearchState::Evaluating
                    }
                }
                SearchState::Evaluating => {
                    if self.oracle.is_sufficient(question, &beam) {
                        SearchState::Answering(StopReason::Sufficient)
                    } else if depth < max_depth {
                        SearchState::Expanding
                    } else {
                        SearchState::Answering(StopReason::DepthLimit)
                    }
                }
                SearchState::Answering(stop) => {
                    return SearchOutcome {
                        paths: beam,
                        depth,
                        stop,
                    };
                }
            };
            tracing::debug!(from = ?state, to = ?next, depth, beam = beam.len(), "search transition");
            state = next;
        }
    }
}

impl fmt::Debug for BeamSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeamSearch")
            .field("expander", &self.expander)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::graph::memory::MemoryGraph;
    use crate::graph::{Edge, GraphResult, GraphStore, Node, QueryParams, QueryTemplate, Record};
    use crate::llm::ScriptedChat;
    use crate::llm::prompts::PromptTemplates;

    fn kb() -> PartitionKey {
        PartitionKey::new("kb").unwrap()
    }

    /// A-r1-B-r2-C-r3-D plus a star of five `has_part` edges around H.
    fn graph() -> MemoryGraph {
        let p = kb();
        let g = MemoryGraph::new();
        for name in ["A", "B", "C", "D", "H", "P1", "P2", "P3", "P4", "P5"] {
            g.insert_node(Node::new(name, name, &p)).unwrap();
        }
        g.insert_edge(&Edge::new("A", "r1", "B", &p)).unwrap();
        g.insert_edge(&Edge::new("B", "r2", "C", &p)).unwrap();
        g.insert_edge(&Edge::new("C", "r3", "D", &p)).unwrap();
        for part in ["P1", "P2", "P3", "P4", "P5"] {
            g.insert_edge(&Edge::new("H", "has_part", part, &p)).unwrap();
        }
        g
    }

    struct CountingStore {
        inner: MemoryGraph,
        neighbor_calls: AtomicUsize,
    }

    impl GraphStore for CountingStore {
        fn run_query(&self, template: QueryTemplate, params: &QueryParams) -> GraphResult<Vec<Record>> {
            if template == QueryTemplate::Neighbors {
                self.neighbor_calls.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.run_query(template, params)
        }
    }

    fn search(store: Arc<dyn GraphStore>, chat: Arc<ScriptedChat>) -> BeamSearch {
        let prompts = Arc::new(PromptTemplates::default());
        let pruner = Pruner::new(chat.clone(), prompts.clone());
        let expander = Expander::new(NeighborhoodProvider::new(store), pruner, kb());
        BeamSearch::new(expander, SufficiencyOracle::new(chat, prompts))
    }

    fn seeds(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extend_builds_a_chain() {
        let p = ReasoningPath::seed("A").extend("r1", "B").extend("r2", "C");
        assert_eq!(p.depth(), 2);
        assert_eq!(p.tail(), "C");
        assert_eq!(p.hops()[1].source.as_deref(), Some("A"));
        assert_eq!(p.hops()[2].source.as_deref(), Some("B"));
        assert_eq!(p.to_string(), "(A) --[r1]--> (B) -> (B) --[r2]--> (C)");
        assert!(ReasoningPath::seed("A").is_bare());
    }

    #[test]
    fn extend_leaves_original_untouched() {
        let seed = ReasoningPath::seed("A");
        let _ = seed.extend("r1", "B");
        assert_eq!(seed.depth(), 0);
    }

    struct PreferTail(&'static str);

    impl PathScorer for PreferTail {
        fn score(&self, path: &ReasoningPath) -> f32 {
            if path.tail() == self.0 { 1.0 } else { 0.0 }
        }
    }

    #[test]
    fn rank_is_stable_and_bounded() {
        let paths: Vec<ReasoningPath> = ["x", "y", "z"]
            .iter()
            .map(|t| ReasoningPath::seed("A").extend("r", *t))
            .collect();
        let kept = rank(paths.clone(), &GenerationOrder, 2);
        assert_eq!(kept, paths[..2].to_vec());

        let kept = rank(paths.clone(), &PreferTail("z"), 2);
        assert_eq!(kept[0].tail(), "z");
        assert_eq!(kept[1].tail(), "x");
    }

    #[test]
    fn expand_skips_visited_entities() {
        let chat = Arc::new(ScriptedChat::new());
        let s = search(Arc::new(graph()), chat.clone());
        let beam = vec![ReasoningPath::seed("A").extend("r1", "B")];
        let next = s.expander.expand("q", &beam, 3);
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].tail(), "C");
        assert_eq!(chat.call_count(), 0);
    }

    #[test]
    fn expand_fetches_each_tail_once() {
        let store = Arc::new(CountingStore {
            inner: graph(),
            neighbor_calls: AtomicUsize::new(0),
        });
        let chat = Arc::new(ScriptedChat::new());
        let s = search(store.clone(), chat);
        let beam = vec![
            ReasoningPath::seed("A").extend("r1", "B"),
            ReasoningPath::seed("C").extend("r2", "B"),
        ];
        let next = s.expander.expand("q", &beam, 3);
        assert_eq!(store.neighbor_calls.load(Ordering::SeqCst), 1);
        let tails: Vec<&str> = next.iter().map(|p| p.tail()).collect();
        assert_eq!(tails, vec!["C", "A"]);
    }

    #[test]
    fn beam_never_exceeds_width() {
        let chat = Arc::new(ScriptedChat::new().otherwise("none of these"));
        let s = search(Arc::new(graph()), chat);
        let out = s.run("parts of H?", &seeds(&["H"]), 3, 2);
        assert!(out.paths.len() <= 2);
        assert_eq!(out.paths[0].tail(), "P1");
        assert_eq!(out.paths[1].tail(), "P2");
    }

    #[test]
    fn stops_when_frontier_is_exhausted() {
        let chat = Arc::new(ScriptedChat::new().otherwise("No"));
        let s = search(Arc::new(graph()), chat);
        let out = s.run("q", &seeds(&["A"]), 5, 3);
        assert_eq!(out.stop, StopReason::Exhausted);
        assert_eq!(out.depth, 3);
        assert_eq!(out.paths[0].tail(), "D");
    }

    #[test]
    fn depth_limit_is_respected() {
        let chat = Arc::new(ScriptedChat::new().otherwise("No"));
        let s = search(Arc::new(graph()), chat);
        let out = s.run("q", &seeds(&["A"]), 2, 3);
        assert_eq!(out.stop, StopReason::DepthLimit);
        assert_eq!(out.depth, 2);
        assert!(out.paths.iter().all(|p| p.depth() <= 2));
    }

    #[test]
    fn sufficient_beam_stops_early() {
        let chat = Arc::new(ScriptedChat::new().on("Answer with only", "Yes"));
        let s = search(Arc::new(graph()), chat.clone());
        let out = s.run("q", &seeds(&["A"]), 3, 3);
        assert_eq!(out.stop, StopReason::Sufficient);
        assert_eq!(out.depth, 1);
        assert_eq!(chat.calls_containing("Answer with only"), 1);
    }

    #[test]
    fn unknown_seed_keeps_bare_beam() {
        let chat = Arc::new(ScriptedChat::new());
        let s = search(Arc::new(graph()), chat.clone());
        let out = s.run("q", &seeds(&["Nowhere"]), 3, 3);
        assert_eq!(out.stop, StopReason::Exhausted);
        assert_eq!(out.depth, 0);
        assert_eq!(out.paths, vec![ReasoningPath::seed("Nowhere")]);
        assert_eq!(chat.call_count(), 0);
    }
}
