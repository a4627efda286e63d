// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # tog-engine
//!
//! Think-on-Graph question answering over a partitioned knowledge graph.
//! An LLM guides a bounded beam search: it picks relations and entities to
//! follow, judges when the discovered paths suffice, and writes the answer.
//!
//! ## Architecture
//!
//! - **Partitions** (`partition`): every node, edge and query is scoped by a key
//! - **Graph stores** (`graph`): the `GraphStore` template interface with an
//!   in-memory (petgraph) adapter and a Neo4j HTTP adapter
//! - **Entity linking** (`link`): HNSW name index with lexical fallback
//! - **LLM access** (`llm`): Ollama client, prompt templates, scripted client
//! - **Pruning** (`prune`): top-k relation and entity selection
//! - **Beam search** (`beam`): paths, scoring, the expansion step and controller
//! - **Oracle** (`oracle`): sufficiency judgement and answer synthesis
//! - **Engine** (`engine`): `reason(question, max_depth, max_width)`
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tog_engine::engine::{EngineConfig, ToGEngine};
//! use tog_engine::graph::memory::MemoryGraph;
//! use tog_engine::graph::{Edge, Node};
//! use tog_engine::llm::{OllamaClient, OllamaConfig};
//! use tog_engine::partition::PartitionKey;
//!
//! let kb = PartitionKey::new("plant-a").unwrap();
//! let graph = MemoryGraph::new();
//! graph.insert_node(Node::new("1", "Drill Press", &kb)).unwrap();
//! graph.insert_node(Node::new("2", "Workshop 3", &kb)).unwrap();
//! graph.insert_edge(&Edge::new("1", "located_in", "2", &kb)).unwrap();
//!
//! let chat = Arc::new(OllamaClient::new(OllamaConfig::default()));
//! let engine = ToGEngine::new(EngineConfig::default(), kb, Arc::new(graph), chat);
//! let result = engine.reason("Where is the drill press?", 3, 3);
//! println!("{}", result.answer);
//! ```

pub mod beam;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod link;
pub mod llm;
pub mod oracle;
pub mod partition;
pub mod prune;
