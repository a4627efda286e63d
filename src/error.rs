//! Rich diagnostic error types for the ToG engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. `ToGError` wraps them transparently so
//! the full diagnostic chain reaches the CLI.

use miette::Diagnostic;
use thiserror::Error;

use crate::llm::LlmError;
use crate::partition::PartitionError;

/// Top-level error type for the ToG engine.
#[derive(Debug, Error, Diagnostic)]
pub enum ToGError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Partition(#[from] PartitionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("node not found: \"{name}\" in partition \"{partition}\"")]
    #[diagnostic(
        code(tog::graph::node_not_found),
        help("Insert the node into this partition before adding edges that reference it.")
    )]
    NodeNotFound { name: String, partition: String },

    #[error("duplicate node: \"{id}\" already exists in partition \"{partition}\"")]
    #[diagnostic(
        code(tog::graph::duplicate_node),
        help("Node identifiers must be unique within a partition.")
    )]
    DuplicateNode { id: String, partition: String },

    #[error(
        "partition mismatch: edge in \"{edge}\" connects nodes in \"{source_partition}\" and \"{target_partition}\""
    )]
    #[diagnostic(
        code(tog::graph::partition_mismatch),
        help(
            "Both endpoints of an edge must live in the edge's own partition. \
             Cross-partition edges are not allowed."
        )
    )]
    PartitionMismatch {
        edge: String,
        source_partition: String,
        target_partition: String,
    },

    #[error("hop count {hops} outside the allowed range 1..={max}")]
    #[diagnostic(
        code(tog::graph::hop_range),
        help("Neighbor and path queries accept between 1 and {max} hops.")
    )]
    HopRange { hops: usize, max: usize },

    #[error("missing query parameter \"{name}\" for {template}")]
    #[diagnostic(
        code(tog::graph::missing_param),
        help("Bind every parameter the query template references before running it.")
    )]
    MissingParam { name: String, template: String },

    #[error("graph store request failed: {message}")]
    #[diagnostic(
        code(tog::graph::request_failed),
        help("Check that the graph server is reachable and the credentials are correct.")
    )]
    RequestFailed { message: String },

    #[error("graph store returned errors: {message}")]
    #[diagnostic(
        code(tog::graph::query_failed),
        help("The server rejected the query. Inspect the message for the failing clause.")
    )]
    QueryFailed { message: String },

    #[error("failed to read graph snapshot {path}: {message}")]
    #[diagnostic(
        code(tog::graph::snapshot),
        help("The snapshot must be a JSON document with `nodes` and `edges` arrays.")
    )]
    Snapshot { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Linking errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LinkError {
    #[error("name index unavailable: {message}")]
    #[diagnostic(
        code(tog::link::index_unavailable),
        help(
            "The dense name index could not be loaded. Entity linking falls back \
             to lexical matching against the graph store."
        )
    )]
    IndexUnavailable { message: String },

    #[error("embedding dimension mismatch: index has {expected}, query has {actual}")]
    #[diagnostic(
        code(tog::link::dim_mismatch),
        help(
            "The query embedder must be the same model the index was built with. \
             Check `index.embedder` and `llm.embedding_model` in the config."
        )
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding failed: {message}")]
    #[diagnostic(
        code(tog::link::embedding),
        help("The embedder could not produce a vector for the mention.")
    )]
    Embedding { message: String },

    #[error("HNSW index error: {message}")]
    #[diagnostic(
        code(tog::link::hnsw_error),
        help("The HNSW approximate nearest-neighbor index encountered an internal error.")
    )]
    HnswError { message: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config {path}")]
    #[diagnostic(
        code(tog::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path}")]
    #[diagnostic(code(tog::config::write), help("Check directory permissions."))]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(tog::config::parse),
        help("The config file must be valid TOML. See `tog config` for the full layout.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(tog::config::invalid))]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("invalid argument: {message}")]
    #[diagnostic(
        code(tog::engine::invalid_argument),
        help("`max_width` must be at least 1 and the question must not be blank.")
    )]
    InvalidArgument { message: String },

    #[error("reasoning aborted: {message}")]
    #[diagnostic(
        code(tog::engine::aborted),
        help("An unexpected failure occurred inside the reasoning pipeline. This is a bug.")
    )]
    Aborted { message: String },
}

/// Convenience alias for functions returning ToG results.
pub type ToGResult<T> = std::result::Result<T, ToGError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_converts_to_tog_error() {
        let err = GraphError::HopRange { hops: 9, max: 5 };
        let tog: ToGError = err.into();
        assert!(matches!(tog, ToGError::Graph(GraphError::HopRange { .. })));
    }

    #[test]
    fn llm_error_converts_to_tog_error() {
        let err = LlmError::ParseError {
            message: "bad".into(),
        };
        let tog: ToGError = err.into();
        assert!(matches!(tog, ToGError::Llm(LlmError::ParseError { .. })));
    }

    #[test]
    fn partition_mismatch_message_names_both_sides() {
        let err = GraphError::PartitionMismatch {
            edge: "kb-a".into(),
            source_partition: "kb-a".into(),
            target_partition: "kb-b".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("kb-a"));
        assert!(msg.contains("kb-b"));
    }
}
