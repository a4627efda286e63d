//! Entity linking: free-text mentions to canonical node names.
//!
//! Each mention is resolved by a k=1 nearest-neighbour lookup against a
//! [`DenseRetriever`] and accepted when the distance is within the threshold.
//! [`NameIndex`] compares unit vectors, so its distances lie in `[0, 2]`.
//! Without a retriever, or when it fails on a mention, the linker falls back
//! to lexical matching through the graph store: exact name, then the
//! shortest case-insensitive substring match.

pub mod embed;
pub mod index;

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::LinkError;
use crate::graph::{GraphStore, QueryParams, QueryTemplate, record_str};
use crate::partition::PartitionKey;

pub use embed::HashedEmbedder;
pub use index::NameIndex;

/// Default distance threshold for accepting a dense match.
///
/// On unit vectors an L2 distance of 1.0 is a cosine similarity of 0.5.
pub const DEFAULT_LINK_THRESHOLD: f32 = 1.0;

/// Nearest-neighbour lookup over canonical entity names.
pub trait DenseRetriever: Send + Sync {
    /// Closest indexed name and its distance, if the index has any entries.
    fn top1(&self, query: &str) -> Result<Option<(String, f32)>, LinkError>;
}

/// Resolves mentions to node names within one partition.
#[derive(Clone)]
pub struct EntityLinker {
    store: Arc<dyn GraphStore>,
    partition: PartitionKey,
    retriever: Option<Arc<dyn DenseRetriever>>,
}

impl EntityLinker {
    pub fn new(store: Arc<dyn GraphStore>, partition: PartitionKey) -> Self {
        Self {
            store,
            partition,
            retriever: None,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn DenseRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn has_retriever(&self) -> bool {
        self.retriever.is_some()
    }

    /// Link every mention, keeping first-seen order and dropping duplicates.
    ///
    /// Misses keep the raw mention. Blank mentions are dropped. The output is
    /// never longer than the input.
    pub fn link(&self, mentions: &[String], threshold: f32) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut linked = Vec::with_capacity(mentions.len());
        for mention in mentions {
            let mention = mention.trim();
            if mention.is_empty() {
                continue;
            }
            let name = self.link_one(mention, threshold);
            if seen.insert(name.clone()) {
                linked.push(name);
            }
        }
        tracing::debug!(
            partition = %self.partition,
            mentions = mentions.len(),
            linked = linked.len(),
            "entities linked"
        );
        linked
    }

    fn link_one(&self, mention: &str, threshold: f32) -> String {
        let Some(retriever) = &self.retriever else {
            return self.lexical(mention).unwrap_or_else(|| mention.to_string());
        };
        match retriever.top1(mention) {
            Ok(Some((name, distance))) if distance <= threshold => {
                tracing::trace!(mention, name = %name, distance, "dense link");
                name
            }
            Ok(Some((name, distance))) => {
                tracing::debug!(mention, nearest = %name, distance, threshold, "dense link rejected");
                mention.to_string()
            }
            Ok(None) => mention.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, mention, "dense retrieval failed, using lexical match");
                self.lexical(mention).unwrap_or_else(|| mention.to_string())
            }
        }
    }

    /// Exact name match, then the shortest substring match, in this partition.
    pub fn lexical(&self, mention: &str) -> Option<String> {
        let exact = QueryParams::new(&self.partition)
            .bind("name", mention)
            .bind("limit", 1);
        if let Some(name) = self.first_name(QueryTemplate::EntityExact, &exact) {
            return Some(name);
        }
        let contains = QueryParams::new(&self.partition)
            .bind("keyword", mention)
            .bind("limit", 1);
        self.first_name(QueryTemplate::EntityContains, &contains)
    }

    fn first_name(&self, template: QueryTemplate, params: &QueryParams) -> Option<String> {
        match self.store.run_query(template, params) {
            Ok(records) => records
                .iter()
                .find_map(|r| record_str(r, "name").map(str::to_string)),
            Err(e) => {
                tracing::warn!(error = %e, template = %template, "lexical lookup failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for EntityLinker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityLinker")
            .field("partition", &self.partition)
            .field("retriever", &self.retriever.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::MemoryGraph;
    use crate::graph::Node;

    fn kb(name: &str) -> PartitionKey {
        PartitionKey::new(name).unwrap()
    }

    fn graph() -> Arc<MemoryGraph> {
        let g = MemoryGraph::new();
        let p = kb("kb");
        for (id, name) in [("1", "Drill Press"), ("2", "Drill"), ("3", "Paint Booth")] {
            g.insert_node(Node::new(id, name, &p)).unwrap();
        }
        g.insert_node(Node::new("9", "Lathe", &kb("other"))).unwrap();
        Arc::new(g)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    struct FixedRetriever(Option<(String, f32)>);

    impl DenseRetriever for FixedRetriever {
        fn top1(&self, _: &str) -> Result<Option<(String, f32)>, LinkError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenRetriever;

    impl DenseRetriever for BrokenRetriever {
        fn top1(&self, _: &str) -> Result<Option<(String, f32)>, LinkError> {
            Err(LinkError::HnswError {
                message: "broken".into(),
            })
        }
    }

    #[test]
    fn empty_input_links_nothing() {
        let linker = EntityLinker::new(graph(), kb("kb"));
        assert!(linker.link(&[], DEFAULT_LINK_THRESHOLD).is_empty());
        assert!(linker.link(&strings(&["  ", ""]), DEFAULT_LINK_THRESHOLD).is_empty());
    }

    #[test]
    fn lexical_prefers_exact_then_shortest_substring() {
        let linker = EntityLinker::new(graph(), kb("kb"));
        assert_eq!(linker.lexical("Drill Press").as_deref(), Some("Drill Press"));
        assert_eq!(linker.lexical("dri").as_deref(), Some("Drill"));
        assert_eq!(linker.lexical("booth").as_deref(), Some("Paint Booth"));
        assert_eq!(linker.lexical("Lathe"), None);
    }

    #[test]
    fn output_is_deduplicated_and_ordered() {
        let linker = EntityLinker::new(graph(), kb("kb"));
        let linked = linker.link(
            &strings(&["paint booth", "Unknown Thing", "PAINT BOOTH", "Drill"]),
            DEFAULT_LINK_THRESHOLD,
        );
        assert_eq!(linked, vec!["Paint Booth", "Unknown Thing", "Drill"]);
    }

    #[test]
    fn dense_match_respects_threshold() {
        let near = EntityLinker::new(graph(), kb("kb"))
            .with_retriever(Arc::new(FixedRetriever(Some(("Drill Press".into(), 0.4)))));
        assert_eq!(near.link(&strings(&["press"]), DEFAULT_LINK_THRESHOLD), vec!["Drill Press"]);

        let far = EntityLinker::new(graph(), kb("kb"))
            .with_retriever(Arc::new(FixedRetriever(Some(("Drill Press".into(), 1.3)))));
        assert_eq!(far.link(&strings(&["press"]), DEFAULT_LINK_THRESHOLD), vec!["press"]);
    }

    #[test]
    fn empty_retrieval_keeps_raw_mention() {
        let linker = EntityLinker::new(graph(), kb("kb"))
            .with_retriever(Arc::new(FixedRetriever(None)));
        assert_eq!(linker.link(&strings(&["drill"]), DEFAULT_LINK_THRESHOLD), vec!["drill"]);
    }

    #[test]
    fn retriever_error_falls_back_to_lexical() {
        let linker = EntityLinker::new(graph(), kb("kb")).with_retriever(Arc::new(BrokenRetriever));
        assert_eq!(linker.link(&strings(&["paint"]), DEFAULT_LINK_THRESHOLD), vec!["Paint Booth"]);
    }
}
