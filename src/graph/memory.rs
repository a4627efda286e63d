//! In-memory partitioned property graph.
//!
//! Uses `petgraph` for the graph structure and `DashMap` for lookups by
//! `(partition, id)` and `(partition, name)`. Implements [`GraphStore`] by
//! executing each [`QueryTemplate`] natively, so it can stand in for a remote
//! graph database in tests, benchmarks and the CLI.

use std::path::Path;
use std::sync::RwLock;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use crate::error::GraphError;
use crate::partition::PartitionKey;

use super::traverse::{neighborhood_bfs, shortest_paths};
use super::{Edge, EdgeData, GraphResult, GraphStore, Node, QueryParams, QueryTemplate, Record};

type Scoped = (PartitionKey, String);

/// JSON snapshot layout: `{ "nodes": [...], "edges": [...] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// In-memory property graph with per-partition indexes.
pub struct MemoryGraph {
    /// Nodes carry their full [`Node`] record; edges carry [`EdgeData`].
    graph: RwLock<DiGraph<Node, EdgeData>>,
    /// (partition, id) → NodeIndex.
    id_index: DashMap<Scoped, NodeIndex>,
    /// (partition, name) → nodes with that display name.
    name_index: DashMap<Scoped, Vec<NodeIndex>>,
    /// id → partitions holding a node with that id.
    id_partitions: DashMap<String, Vec<PartitionKey>>,
    edge_count: std::sync::atomic::AtomicUsize,
}

impl MemoryGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(DiGraph::new()),
            id_index: DashMap::new(),
            name_index: DashMap::new(),
            id_partitions: DashMap::new(),
            edge_count: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Load a graph from a JSON snapshot file.
    pub fn from_snapshot_file(path: &Path) -> GraphResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| GraphError::Snapshot {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let snapshot: GraphSnapshot =
            serde_json::from_str(&content).map_err(|e| GraphError::Snapshot {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let graph = Self::new();
        graph.load(&snapshot)?;
        tracing::info!(
            path = %path.display(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "loaded graph snapshot"
        );
        Ok(graph)
    }

    /// Bulk-load a snapshot. Nodes are inserted before edges.
    pub fn load(&self, snapshot: &GraphSnapshot) -> GraphResult<()> {
        for node in &snapshot.nodes {
            self.insert_node(node.clone())?;
        }
        for edge in &snapshot.edges {
            self.insert_edge(edge)?;
        }
        Ok(())
    }

    /// Insert a node. Its `degree` is recomputed from inserted edges.
    ///
    /// The `(partition, id)` slot is claimed before the node is added, so of
    /// two concurrent inserts of the same id exactly one succeeds.
    pub fn insert_node(&self, mut node: Node) -> GraphResult<NodeIndex> {
        let slot = match self.id_index.entry((node.partition.clone(), node.id.clone())) {
            Entry::Occupied(_) => {
                return Err(GraphError::DuplicateNode {
                    id: node.id,
                    partition: node.partition.to_string(),
                });
            }
            Entry::Vacant(slot) => slot,
        };
        let name_key = (node.partition.clone(), node.name.clone());
        let id = node.id.clone();
        let partition = node.partition.clone();
        node.degree = 0;
        let idx = {
            let mut graph = self.graph.write().expect("graph lock poisoned");
            graph.add_node(node)
        };
        slot.insert(idx);
        self.name_index.entry(name_key).or_default().push(idx);
        self.id_partitions.entry(id).or_default().push(partition);
        Ok(idx)
    }

    /// Insert an edge between two nodes of the edge's partition.
    pub fn insert_edge(&self, edge: &Edge) -> GraphResult<()> {
        let (src, dst) = match (
            self.lookup(&edge.partition, &edge.source),
            self.lookup(&edge.partition, &edge.target),
        ) {
            (Some(src), Some(dst)) => (src, dst),
            (src, dst) => {
                return Err(GraphError::PartitionMismatch {
                    edge: edge.partition.to_string(),
                    source_partition: self.endpoint_partition(edge, &edge.source, src)?,
                    target_partition: self.endpoint_partition(edge, &edge.target, dst)?,
                });
            }
        };

        {
            let mut graph = self.graph.write().expect("graph lock poisoned");
            graph.add_edge(src, dst, EdgeData::from(edge));
            graph[src].degree += 1;
            if dst != src {
                graph[dst].degree += 1;
            }
        }
        self.edge_count
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    fn lookup(&self, partition: &PartitionKey, id: &str) -> Option<NodeIndex> {
        self.id_index
            .get(&(partition.clone(), id.to_string()))
            .map(|idx| *idx.value())
    }

    /// Partition an endpoint actually lives in, or `NodeNotFound` when the id
    /// exists nowhere.
    fn endpoint_partition(
        &self,
        edge: &Edge,
        id: &str,
        resolved: Option<NodeIndex>,
    ) -> GraphResult<String> {
        if resolved.is_some() {
            return Ok(edge.partition.to_string());
        }
        self.id_partitions
            .get(id)
            .and_then(|partitions| partitions.value().first().map(PartitionKey::to_string))
            .ok_or_else(|| GraphError::NodeNotFound {
                name: id.to_string(),
                partition: edge.partition.to_string(),
            })
    }

    /// Look up a node by `(partition, id)`.
    pub fn node(&self, partition: &PartitionKey, id: &str) -> Option<Node> {
        let idx = self.lookup(partition, id)?;
        let graph = self.graph.read().expect("graph lock poisoned");
        graph.node_weight(idx).cloned()
    }

    /// Exact display-name match inside a partition.
    pub fn find_exact(&self, partition: &PartitionKey, name: &str) -> Option<String> {
        self.name_index
            .get(&(partition.clone(), name.to_string()))
            .filter(|v| !v.value().is_empty())
            .map(|_| name.to_string())
    }

    /// Case-insensitive substring match inside a partition.
    ///
    /// Shorter names rank first, then lexicographic order.
    pub fn find_containing(
        &self,
        partition: &PartitionKey,
        keyword: &str,
        limit: usize,
    ) -> Vec<String> {
        let needle = normalize(keyword);
        if needle.is_empty() {
            return Vec::new();
        }
        let mut names: Vec<String> = self
            .name_index
            .iter()
            .filter(|e| &e.key().0 == partition && !e.value().is_empty())
            .map(|e| e.key().1.clone())
            .filter(|name| normalize(name).contains(&needle))
            .collect();
        names.sort_by(|a, b| {
            a.chars()
                .count()
                .cmp(&b.chars().count())
                .then_with(|| a.cmp(b))
        });
        names.truncate(limit);
        names
    }

    /// All display names in a partition, sorted.
    pub fn names(&self, partition: &PartitionKey) -> Vec<String> {
        let mut names: Vec<String> = self
            .name_index
            .iter()
            .filter(|e| &e.key().0 == partition)
            .map(|e| e.key().1.clone())
            .collect();
        names.sort();
        names
    }

    fn name_seeds(&self, partition: &PartitionKey, name: &str) -> Vec<NodeIndex> {
        self.name_index
            .get(&(partition.clone(), name.to_string()))
            .map(|v| v.value().clone())
            .unwrap_or_default()
    }

    fn neighbors(
        &self,
        partition: &PartitionKey,
        name: &str,
        hops: usize,
        limit: usize,
    ) -> Vec<Record> {
        let seeds = self.name_seeds(partition, name);
        if seeds.is_empty() {
            return Vec::new();
        }
        let graph = self.graph.read().expect("graph lock poisoned");
        let reached = neighborhood_bfs(&graph, &seeds, partition, hops, usize::MAX);

        let mut seen = std::collections::HashSet::new();
        let mut records = Vec::new();
        for r in reached {
            // identity, not display name: a same-named node is a real neighbor
            if r.node == r.seed {
                continue;
            }
            let target = graph[r.node].name.clone();
            if !seen.insert((r.relation.clone(), target.clone())) {
                continue;
            }
            let mut rec = Record::new();
            rec.insert("source".into(), Value::String(name.to_string()));
            rec.insert("relation".into(), Value::String(r.relation));
            rec.insert("target".into(), Value::String(target));
            records.push(rec);
            if records.len() >= limit {
                break;
            }
        }
        records
    }

    fn paths(
        &self,
        partition: &PartitionKey,
        source: &str,
        target: &str,
        hops: usize,
        limit: usize,
    ) -> Vec<Record> {
        let sources = self.name_seeds(partition, source);
        let targets = self.name_seeds(partition, target);
        let graph = self.graph.read().expect("graph lock poisoned");

        let mut records = Vec::new();
        for &s in &sources {
            for &t in &targets {
                let remaining = limit.saturating_sub(records.len());
                for trace in shortest_paths(&graph, s, t, partition, hops, remaining) {
                    let nodes: Vec<Value> = trace
                        .nodes
                        .iter()
                        .map(|&n| Value::String(graph[n].name.clone()))
                        .collect();
                    let relations: Vec<Value> =
                        trace.relations.into_iter().map(Value::String).collect();
                    let mut rec = Record::new();
                    rec.insert("nodes".into(), Value::Array(nodes));
                    rec.insert("relations".into(), Value::Array(relations));
                    records.push(rec);
                }
            }
        }
        records.truncate(limit);
        records
    }

    /// Number of nodes across all partitions.
    pub fn node_count(&self) -> usize {
        self.id_index.len()
    }

    /// Number of edges across all partitions.
    pub fn edge_count(&self) -> usize {
        self.edge_count.load(std::sync::atomic::Ordering::Relaxed)
    }
}

fn name_record(name: String) -> Record {
    let mut rec = Record::new();
    rec.insert("name".into(), Value::String(name));
    rec
}

/// NFKC-normalize and lowercase for lexical matching.
pub(crate) fn normalize(s: &str) -> String {
    s.trim().nfkc().collect::<String>().to_lowercase()
}

impl GraphStore for MemoryGraph {
    fn run_query(&self, template: QueryTemplate, params: &QueryParams) -> GraphResult<Vec<Record>> {
        let partition = params.partition();
        let records = match template {
            QueryTemplate::EntityExact => {
                let name = params.str("name", template)?;
                self.find_exact(partition, name)
                    .into_iter()
                    .map(name_record)
                    .collect()
            }
            QueryTemplate::EntityContains => {
                let keyword = params.str("keyword", template)?;
                let limit = params.usize("limit", template)?;
                self.find_containing(partition, keyword, limit)
                    .into_iter()
                    .map(name_record)
                    .collect()
            }
            QueryTemplate::Neighbors => {
                let name = params.str("name", template)?;
                let hops = params.hops(template)?;
                let limit = params.usize("limit", template)?;
                self.neighbors(partition, name, hops, limit)
            }
            QueryTemplate::ShortestPaths => {
                let source = params.str("source", template)?;
                let target = params.str("target", template)?;
                let hops = params.hops(template)?;
                let limit = params.usize("limit", template)?;
                self.paths(partition, source, target, hops, limit)
            }
        };
        tracing::trace!(
            template = %template,
            partition = %partition,
            rows = records.len(),
            "memory graph query"
        );
        Ok(records)
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGraph")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kb(name: &str) -> PartitionKey {
        PartitionKey::new(name).unwrap()
    }

    fn two_partitions() -> MemoryGraph {
        let g = MemoryGraph::new();
        let a = kb("a");
        let b = kb("b");
        g.insert_node(Node::new("1", "Server", &a)).unwrap();
        g.insert_node(Node::new("2", "Rack", &a)).unwrap();
        g.insert_edge(&Edge::new("1", "mounted_in", "2", &a)).unwrap();
        g.insert_node(Node::new("1", "Server", &b)).unwrap();
        g.insert_node(Node::new("9", "Datacenter", &b)).unwrap();
        g.insert_edge(&Edge::new("1", "located_in", "9", &b)).unwrap();
        g
    }

    #[test]
    fn same_name_in_two_partitions_does_not_collide() {
        let g = two_partitions();
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.node(&kb("a"), "1").unwrap().degree, 1);
        assert_eq!(g.node(&kb("b"), "1").unwrap().degree, 1);
    }

    #[test]
    fn neighbors_are_partition_scoped() {
        let g = two_partitions();
        let params = QueryParams::new(&kb("a"))
            .bind("name", "Server")
            .bind("hops", 1)
            .bind("limit", 100);
        let rows = g.run_query(QueryTemplate::Neighbors, &params).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["relation"], "mounted_in");
        assert_eq!(rows[0]["target"], "Rack");
    }

    #[test]
    fn cross_partition_edge_is_rejected() {
        let g = two_partitions();
        let err = g
            .insert_edge(&Edge::new("2", "near", "9", &kb("a")))
            .unwrap_err();
        assert!(matches!(err, GraphError::PartitionMismatch { .. }));
    }

    #[test]
    fn partition_mismatch_names_each_endpoint() {
        let g = two_partitions();
        match g.insert_edge(&Edge::new("9", "near", "2", &kb("a"))).unwrap_err() {
            GraphError::PartitionMismatch {
                edge,
                source_partition,
                target_partition,
            } => {
                assert_eq!(edge, "a");
                assert_eq!(source_partition, "b");
                assert_eq!(target_partition, "a");
            }
            other => panic!("unexpected error: {other}"),
        }
        match g.insert_edge(&Edge::new("2", "near", "9", &kb("a"))).unwrap_err() {
            GraphError::PartitionMismatch {
                source_partition,
                target_partition,
                ..
            } => {
                assert_eq!(source_partition, "a");
                assert_eq!(target_partition, "b");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            g.insert_edge(&Edge::new("2", "near", "nowhere", &kb("a"))),
            Err(GraphError::NodeNotFound { .. })
        ));
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn concurrent_duplicate_inserts_admit_one() {
        let g = MemoryGraph::new();
        let p = kb("kb");
        let admitted = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| g.insert_node(Node::new("dup", "Dup", &p)).is_ok()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });
        assert_eq!(admitted, 1);
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.names(&p), vec!["Dup".to_string()]);
    }

    #[test]
    fn same_named_neighbor_is_kept() {
        let g = MemoryGraph::new();
        let p = kb("kb");
        g.insert_node(Node::new("p1", "Pump", &p)).unwrap();
        g.insert_node(Node::new("p2", "Pump", &p)).unwrap();
        g.insert_node(Node::new("t", "Tank", &p)).unwrap();
        g.insert_edge(&Edge::new("p1", "feeds", "p2", &p)).unwrap();
        g.insert_edge(&Edge::new("p2", "fills", "t", &p)).unwrap();

        let params = QueryParams::new(&p)
            .bind("name", "Pump")
            .bind("hops", 1)
            .bind("limit", 100);
        let rows = g.run_query(QueryTemplate::Neighbors, &params).unwrap();
        let pairs: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r["relation"].as_str().unwrap(), r["target"].as_str().unwrap()))
            .collect();
        assert!(pairs.contains(&("feeds", "Pump")));
        assert!(pairs.contains(&("fills", "Tank")));
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let g = two_partitions();
        let err = g.insert_node(Node::new("1", "Other", &kb("a"))).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode { .. }));
    }

    #[test]
    fn containing_match_is_case_insensitive_and_ranked() {
        let g = MemoryGraph::new();
        let p = kb("kb");
        g.insert_node(Node::new("1", "GHOST Image Backup", &p)).unwrap();
        g.insert_node(Node::new("2", "Ghost Image", &p)).unwrap();
        g.insert_node(Node::new("3", "Copy Files", &p)).unwrap();
        assert_eq!(
            g.find_containing(&p, "ghost image", 5),
            vec!["Ghost Image".to_string(), "GHOST Image Backup".to_string()]
        );
        assert!(g.find_containing(&p, "  ", 5).is_empty());
    }

    #[test]
    fn fullwidth_characters_normalize() {
        let g = MemoryGraph::new();
        let p = kb("kb");
        g.insert_node(Node::new("1", "GHOST镜像", &p)).unwrap();
        assert_eq!(g.find_containing(&p, "ｇｈｏｓｔ", 1), vec!["GHOST镜像".to_string()]);
    }

    #[test]
    fn shortest_paths_template() {
        let g = two_partitions();
        let params = QueryParams::new(&kb("a"))
            .bind("source", "Server")
            .bind("target", "Rack")
            .bind("hops", 3)
            .bind("limit", 5);
        let rows = g.run_query(QueryTemplate::ShortestPaths, &params).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["nodes"], serde_json::json!(["Server", "Rack"]));
        assert_eq!(rows[0]["relations"], serde_json::json!(["mounted_in"]));
    }

    #[test]
    fn snapshot_round_trips_through_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        let p = kb("kb");
        let snapshot = GraphSnapshot {
            nodes: vec![Node::new("a", "A", &p), Node::new("b", "B", &p)],
            edges: vec![Edge::new("a", "part_of", "b", &p).with_weight(0.5)],
        };
        std::fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();
        let g = MemoryGraph::from_snapshot_file(&path).unwrap();
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.find_exact(&p, "A"), Some("A".to_string()));
    }
}
