//! Partition-scoped multi-hop traversal.
//!
//! BFS over the petgraph structure treating edges as undirected, with every
//! visited node and traversed edge required to carry the query's partition
//! key. No traversal ever shortcuts through another partition.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::partition::PartitionKey;

use super::{EdgeData, Node};

/// A node reached from a seed, keyed by the relation of the first hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reached {
    pub seed: NodeIndex,
    pub relation: String,
    pub node: NodeIndex,
    pub hops: usize,
}

/// A shortest path between two nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTrace {
    pub nodes: Vec<NodeIndex>,
    pub relations: Vec<String>,
}

/// Edges incident to `node` inside `partition`, in insertion order.
///
/// Returns `(relation, other endpoint)` pairs for both directions.
pub fn incident_edges(
    graph: &DiGraph<Node, EdgeData>,
    node: NodeIndex,
    partition: &PartitionKey,
) -> Vec<(String, NodeIndex)> {
    let mut edges: Vec<(usize, String, NodeIndex)> = Vec::new();
    for dir in [Direction::Outgoing, Direction::Incoming] {
        for e in graph.edges_directed(node, dir) {
            if &e.weight().partition != partition {
                continue;
            }
            let other = if dir == Direction::Outgoing {
                e.target()
            } else {
                e.source()
            };
            let in_partition = graph
                .node_weight(other)
                .is_some_and(|n| &n.partition == partition);
            if !in_partition {
                continue;
            }
            edges.push((e.id().index(), e.weight().relation.clone(), other));
        }
    }
    // petgraph yields adjacency newest-first; callers expect insertion order.
    edges.sort_by_key(|(idx, _, _)| *idx);
    edges.into_iter().map(|(_, rel, other)| (rel, other)).collect()
}

/// Collect every `(first relation, node)` pair reachable from the seeds
/// within `max_hops`, in BFS order.
///
/// The seed itself is never reported and walks do not re-enter it.
pub fn neighborhood_bfs(
    graph: &DiGraph<Node, EdgeData>,
    seeds: &[NodeIndex],
    partition: &PartitionKey,
    max_hops: usize,
    max_results: usize,
) -> Vec<Reached> {
    let mut results: Vec<Reached> = Vec::new();

    for &seed in seeds {
        let seed_ok = graph
            .node_weight(seed)
            .is_some_and(|n| &n.partition == partition);
        if !seed_ok {
            continue;
        }

        let mut reported: HashSet<(String, NodeIndex)> = HashSet::new();
        let mut visited: HashSet<(String, NodeIndex)> = HashSet::new();
        // (node, first relation, depth)
        let mut queue: VecDeque<(NodeIndex, String, usize)> = VecDeque::new();

        for (relation, other) in incident_edges(graph, seed, partition) {
            if other == seed {
                continue;
            }
            if visited.insert((relation.clone(), other)) {
                queue.push_back((other, relation, 1));
            }
        }

        while let Some((node, relation, depth)) = queue.pop_front() {
            if results.len() >= max_results {
                return results;
            }
            if reported.insert((relation.clone(), node)) {
                results.push(Reached {
                    seed,
                    relation: relation.clone(),
                    node,
                    hops: depth,
                });
            }
            if depth >= max_hops {
                continue;
            }
            for (_, next) in incident_edges(graph, node, partition) {
                if next == seed {
                    continue;
                }
                if visited.insert((relation.clone(), next)) {
                    queue.push_back((next, relation.clone(), depth + 1));
                }
            }
        }
    }

    results
}

/// Enumerate up to `limit` shortest paths from `source` to `target`.
pub fn shortest_paths(
    graph: &DiGraph<Node, EdgeData>,
    source: NodeIndex,
    target: NodeIndex,
    partition: &PartitionKey,
    max_hops: usize,
    limit: usize,
) -> Vec<PathTrace> {
    if source == target || limit == 0 {
        return Vec::new();
    }

    let mut dist: HashMap<NodeIndex, usize> = HashMap::new();
    let mut preds: HashMap<NodeIndex, Vec<(NodeIndex, String)>> = HashMap::new();
    let mut queue: VecDeque<NodeIndex> = VecDeque::new();
    dist.insert(source, 0);
    queue.push_back(source);

    while let Some(node) = queue.pop_front() {
        let d = dist[&node];
        if d >= max_hops {
            continue;
        }
        if dist.get(&target).is_some_and(|&t| d >= t) {
            break;
        }
        for (relation, next) in incident_edges(graph, node, partition) {
            match dist.get(&next) {
                None => {
                    dist.insert(next, d + 1);
                    preds.entry(next).or_default().push((node, relation));
                    queue.push_back(next);
                }
                Some(&nd) if nd == d + 1 => {
                    preds.entry(next).or_default().push((node, relation));
                }
                Some(_) => {}
            }
        }
    }

    if !dist.contains_key(&target) {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, Vec<String>)> =
        vec![(target, vec![target], Vec::new())];
    while let Some((node, nodes, relations)) = stack.pop() {
        if out.len() >= limit {
            break;
        }
        if node == source {
            let mut nodes = nodes;
            let mut relations = relations;
            nodes.reverse();
            relations.reverse();
            out.push(PathTrace { nodes, relations });
            continue;
        }
        if let Some(ps) = preds.get(&node) {
            for (prev, relation) in ps.iter().rev() {
                let mut n = nodes.clone();
                n.push(*prev);
                let mut r = relations.clone();
                r.push(relation.clone());
                stack.push((*prev, n, r));
            }
        }
    }
    out
}
