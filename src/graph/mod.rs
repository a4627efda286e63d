//! Partitioned property graph: data model and the store interface.
//!
//! The engine never talks to a graph database directly. It issues one of a
//! small set of [`QueryTemplate`]s through the [`GraphStore`] trait, always
//! with the partition key bound as a parameter by [`QueryParams`].
//!
//! - **In-memory store** ([`memory::MemoryGraph`]): `petgraph` + `dashmap`,
//!   executes templates natively; used for tests and JSON snapshots
//! - **Neo4j store** ([`neo4j::Neo4jHttpStore`]): Cypher over the HTTP
//!   transactional endpoint
//! - **Neighborhood provider** ([`neighborhood::NeighborhoodProvider`]): the
//!   typed view the reasoning engine consumes

pub mod memory;
pub mod neighborhood;
pub mod neo4j;
pub mod traverse;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GraphError;
use crate::partition::PartitionKey;

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// One result row: column name → value.
pub type Record = serde_json::Map<String, Value>;

/// Maximum hop count accepted by neighbor and path templates.
pub const MAX_HOPS: usize = 5;

/// Node property / parameter name carrying the partition key.
pub const PARTITION_PARAM: &str = "partition";

/// A node in the property graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Identifier, unique within the partition.
    pub id: String,
    /// Display name used for linking and prompts.
    pub name: String,
    /// Type label (e.g. "Operation", "Step").
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Number of incident edges.
    #[serde(default)]
    pub degree: usize,
    pub partition: PartitionKey,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>, partition: &PartitionKey) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            label: String::new(),
            description: String::new(),
            degree: 0,
            partition: partition.clone(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A typed relation between two nodes of the same partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node identifier.
    pub source: String,
    /// Target node identifier.
    pub target: String,
    /// Relation type.
    pub relation: String,
    #[serde(default)]
    pub weight: Option<f32>,
    #[serde(default)]
    pub description: String,
    pub partition: PartitionKey,
}

impl Edge {
    pub fn new(
        source: impl Into<String>,
        relation: impl Into<String>,
        target: impl Into<String>,
        partition: &PartitionKey,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
            weight: None,
            description: String::new(),
            partition: partition.clone(),
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = Some(weight);
        self
    }
}

/// Edge data stored on petgraph edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeData {
    pub relation: String,
    pub weight: Option<f32>,
    pub description: String,
    pub partition: PartitionKey,
}

impl From<&Edge> for EdgeData {
    fn from(e: &Edge) -> Self {
        Self {
            relation: e.relation.clone(),
            weight: e.weight,
            description: e.description.clone(),
            partition: e.partition.clone(),
        }
    }
}

/// The fixed set of read queries the engine issues.
///
/// Every template is partition-scoped on each node and edge it touches.
/// Columns returned per template:
///
/// | template         | params                               | columns                      |
/// |------------------|--------------------------------------|------------------------------|
/// | `EntityExact`    | `name`, `limit`                      | `name`                       |
/// | `EntityContains` | `keyword`, `limit`                   | `name`                       |
/// | `Neighbors`      | `name`, `hops`, `limit`              | `source`, `relation`, `target` |
/// | `ShortestPaths`  | `source`, `target`, `hops`, `limit`  | `nodes`, `relations`         |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryTemplate {
    EntityExact,
    EntityContains,
    Neighbors,
    ShortestPaths,
}

impl QueryTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EntityExact => "entity_exact",
            Self::EntityContains => "entity_contains",
            Self::Neighbors => "neighbors",
            Self::ShortestPaths => "shortest_paths",
        }
    }

    /// Whether the template takes a `hops` parameter.
    pub fn is_bounded(&self) -> bool {
        matches!(self, Self::Neighbors | Self::ShortestPaths)
    }

    /// Cypher text for this template.
    ///
    /// Variable-length bounds cannot be Cypher parameters, so `hops` is
    /// rendered into the text; it is range-checked first. The partition key
    /// and every string value stay parameters.
    pub fn cypher(&self, hops: usize) -> GraphResult<String> {
        if self.is_bounded() && !(1..=MAX_HOPS).contains(&hops) {
            return Err(GraphError::HopRange {
                hops,
                max: MAX_HOPS,
            });
        }
        let query = match self {
            Self::EntityExact => "MATCH (n) \
                 WHERE n.name = $name AND n.partition = $partition \
                 RETURN DISTINCT n.name AS name \
                 LIMIT $limit"
                .to_string(),
            Self::EntityContains => "MATCH (n) \
                 WHERE n.name IS NOT NULL \
                   AND toLower(n.name) CONTAINS toLower($keyword) \
                   AND n.partition = $partition \
                 WITH DISTINCT n.name AS name \
                 RETURN name ORDER BY size(name), name \
                 LIMIT $limit"
                .to_string(),
            Self::Neighbors => format!(
                "MATCH p = (n)-[*1..{hops}]-(m) \
                 WHERE n.name = $name AND n.partition = $partition \
                   AND m <> n \
                   AND all(x IN nodes(p) WHERE x.partition = $partition) \
                   AND all(r IN relationships(p) WHERE r.partition = $partition) \
                 RETURN DISTINCT n.name AS source, \
                   type(relationships(p)[0]) AS relation, \
                   m.name AS target \
                 LIMIT $limit"
            ),
            Self::ShortestPaths => format!(
                "MATCH (s), (t) \
                 WHERE s.name = $source AND t.name = $target \
                   AND s.partition = $partition AND t.partition = $partition \
                 MATCH p = allShortestPaths((s)-[*1..{hops}]-(t)) \
                 WHERE all(x IN nodes(p) WHERE x.partition = $partition) \
                   AND all(r IN relationships(p) WHERE r.partition = $partition) \
                 RETURN [x IN nodes(p) | x.name] AS nodes, \
                   [r IN relationships(p) | type(r)] AS relations \
                 LIMIT $limit"
            ),
        };
        Ok(query)
    }
}

impl fmt::Display for QueryTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters for a template, always carrying the partition key.
///
/// There is no constructor without a partition, and the partition cannot be
/// overwritten through [`bind`](Self::bind).
#[derive(Debug, Clone)]
pub struct QueryParams {
    partition: PartitionKey,
    values: BTreeMap<String, Value>,
}

impl QueryParams {
    pub fn new(partition: &PartitionKey) -> Self {
        Self {
            partition: partition.clone(),
            values: BTreeMap::new(),
        }
    }

    /// Bind a named parameter. Binding `partition` is ignored.
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        if name == PARTITION_PARAM {
            tracing::warn!("ignoring attempt to rebind the partition parameter");
            return self;
        }
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    pub fn str(&self, name: &str, template: QueryTemplate) -> GraphResult<&str> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| GraphError::MissingParam {
                name: name.to_string(),
                template: template.to_string(),
            })
    }

    pub fn usize(&self, name: &str, template: QueryTemplate) -> GraphResult<usize> {
        self.values
            .get(name)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .ok_or_else(|| GraphError::MissingParam {
                name: name.to_string(),
                template: template.to_string(),
            })
    }

    /// Checked `hops` value for bounded templates.
    pub fn hops(&self, template: QueryTemplate) -> GraphResult<usize> {
        let hops = self.usize("hops", template)?;
        if !(1..=MAX_HOPS).contains(&hops) {
            return Err(GraphError::HopRange {
                hops,
                max: MAX_HOPS,
            });
        }
        Ok(hops)
    }

    /// All parameters as a JSON object, partition included.
    pub fn to_json(&self) -> Value {
        let mut map: serde_json::Map<String, Value> = self
            .values
            .iter()
            .filter(|(k, _)| k.as_str() != "hops")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        map.insert(
            PARTITION_PARAM.to_string(),
            Value::String(self.partition.to_string()),
        );
        Value::Object(map)
    }
}

/// Narrow read interface to the partitioned graph store.
pub trait GraphStore: Send + Sync {
    /// Execute a template with its parameters.
    fn run_query(&self, template: QueryTemplate, params: &QueryParams) -> GraphResult<Vec<Record>>;
}

/// Pull a string column out of a record, if present.
pub(crate) fn record_str<'a>(record: &'a Record, column: &str) -> Option<&'a str> {
    record.get(column).and_then(Value::as_str)
}

/// Pull a list-of-strings column out of a record.
pub(crate) fn record_str_list(record: &Record, column: &str) -> Vec<String> {
    record
        .get(column)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
