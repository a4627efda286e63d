//! Typed neighborhood queries over any [`GraphStore`].
//!
//! The provider turns template records into [`Neighbor`]s and
//! [`RelationPath`]s. Absence of data is not a failure: unknown entities and
//! store errors both yield an empty list, with the error logged.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::partition::PartitionKey;

use super::{
    GraphStore, MAX_HOPS, QueryParams, QueryTemplate, record_str, record_str_list,
};

/// Default cap on neighbors returned per entity.
pub const DEFAULT_NEIGHBOR_LIMIT: usize = 100;

/// One entry of an entity's neighborhood.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Neighbor {
    pub source: String,
    /// Type of the first edge on the way to `target`.
    pub relation: String,
    pub target: String,
}

/// A shortest path between two entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationPath {
    pub nodes: Vec<String>,
    pub relations: Vec<String>,
}

/// Fetches partition-scoped neighborhoods from a graph store.
#[derive(Clone)]
pub struct NeighborhoodProvider {
    store: Arc<dyn GraphStore>,
    limit: usize,
}

impl NeighborhoodProvider {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            limit: DEFAULT_NEIGHBOR_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Relations and neighboring entities of `entity` within `depth` hops.
    ///
    /// `depth` is clamped to `1..=MAX_HOPS`. Results are distinct by
    /// `(relation, target)` and keep the store's order.
    pub fn neighbors(&self, entity: &str, partition: &PartitionKey, depth: usize) -> Vec<Neighbor> {
        let depth = depth.clamp(1, MAX_HOPS);
        let params = QueryParams::new(partition)
            .bind("name", entity)
            .bind("hops", depth)
            .bind("limit", self.limit);

        let records = match self.store.run_query(QueryTemplate::Neighbors, &params) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, entity, partition = %partition, "neighbor query failed");
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        records
            .iter()
            .filter_map(|rec| {
                let relation = record_str(rec, "relation")?;
                let target = record_str(rec, "target")?;
                if relation.is_empty() || target.is_empty() {
                    return None;
                }
                Some(Neighbor {
                    source: record_str(rec, "source").unwrap_or(entity).to_string(),
                    relation: relation.to_string(),
                    target: target.to_string(),
                })
            })
            .filter(|n| seen.insert((n.relation.clone(), n.target.clone())))
            .collect()
    }

    /// Targets of `entity` reached through `relation` (one hop).
    pub fn targets_via(&self, entity: &str, partition: &PartitionKey, relation: &str) -> Vec<String> {
        targets_for(&self.neighbors(entity, partition, 1), relation)
    }

    /// Up to five shortest paths from `source` to `target`.
    pub fn relation_paths(
        &self,
        source: &str,
        target: &str,
        partition: &PartitionKey,
        max_hops: usize,
    ) -> Vec<RelationPath> {
        let params = QueryParams::new(partition)
            .bind("source", source)
            .bind("target", target)
            .bind("hops", max_hops.clamp(1, MAX_HOPS))
            .bind("limit", 5);
        match self.store.run_query(QueryTemplate::ShortestPaths, &params) {
            Ok(records) => records
                .iter()
                .map(|rec| RelationPath {
                    nodes: record_str_list(rec, "nodes"),
                    relations: record_str_list(rec, "relations"),
                })
                .filter(|p| !p.relations.is_empty())
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, source, target, "path query failed");
                Vec::new()
            }
        }
    }
}

/// Distinct relations of a neighborhood, in first-seen order.
pub fn distinct_relations(neighbors: &[Neighbor]) -> Vec<String> {
    let mut seen = HashSet::new();
    neighbors
        .iter()
        .filter(|n| seen.insert(n.relation.as_str()))
        .map(|n| n.relation.clone())
        .collect()
}

/// Distinct targets reached through `relation`, in first-seen order.
pub fn targets_for(neighbors: &[Neighbor], relation: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    neighbors
        .iter()
        .filter(|n| n.relation == relation)
        .filter(|n| seen.insert(n.target.as_str()))
        .map(|n| n.target.clone())
        .collect()
}

impl std::fmt::Debug for NeighborhoodProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeighborhoodProvider")
            .field("limit", &self.limit)
            .finish()
    }
}
