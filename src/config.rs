//! TOML configuration for the engine and its collaborators.
//!
//! ```toml
//! [engine]
//! default_max_depth = 3
//! default_max_width = 3
//! linking_threshold = 1.0
//!
//! [llm]
//! base_url = "http://localhost:11434"
//! model = "qwen3:8b"
//!
//! [graph]
//! backend = "neo4j"
//! url = "http://localhost:7474"
//!
//! [index]
//! path = "names.idx"
//! embedder = "ollama"
//!
//! [prompts]
//! reasoning_evaluation = "..."
//! ```
//!
//! Every section and field is optional; missing values take their defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::{EngineConfig, ToGEngine};
use crate::error::{ConfigError, ToGResult};
use crate::graph::GraphStore;
use crate::graph::memory::MemoryGraph;
use crate::graph::neo4j::{Neo4jConfig, Neo4jHttpStore};
use crate::link::embed::{DEFAULT_HASHED_DIM, HashedEmbedder};
use crate::link::index::NameIndex;
use crate::llm::prompts::{PromptKind, PromptTemplates};
use crate::llm::{ChatClient, Embedder, OllamaClient, OllamaConfig};
use crate::partition::PartitionKey;

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Which graph store adapter to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphBackend {
    /// In-process store, optionally loaded from a JSON snapshot.
    #[default]
    Memory,
    /// Neo4j over its HTTP transactional endpoint.
    Neo4j,
}

/// The `[graph]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    pub backend: GraphBackend,
    /// JSON snapshot for the memory backend.
    pub snapshot: Option<PathBuf>,
    pub url: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub timeout_secs: u64,
}

impl Default for GraphSection {
    fn default() -> Self {
        let neo4j = Neo4jConfig::default();
        Self {
            backend: GraphBackend::default(),
            snapshot: None,
            url: neo4j.url,
            database: neo4j.database,
            user: neo4j.user,
            password: neo4j.password,
            timeout_secs: neo4j.timeout_secs,
        }
    }
}

impl GraphSection {
    pub fn neo4j(&self) -> Neo4jConfig {
        Neo4jConfig {
            url: self.url.clone(),
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

/// Which embedder turns mentions into index queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// Ollama `/api/embeddings` with `llm.embedding_model`.
    #[default]
    Ollama,
    /// Offline character n-gram hashing.
    Hashed,
}

/// The `[index]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    /// Persisted name index. Without one, linking is lexical only.
    pub path: Option<PathBuf>,
    pub embedder: EmbedderKind,
    /// Vector width of the hashed embedder.
    pub hashed_dim: usize,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            path: None,
            embedder: EmbedderKind::default(),
            hashed_dim: DEFAULT_HASHED_DIM,
        }
    }
}

/// Complete `tog` configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToGConfig {
    pub engine: EngineConfig,
    pub llm: OllamaConfig,
    pub graph: GraphSection,
    pub index: IndexSection,
    /// Per-operation prompt overrides.
    pub prompts: BTreeMap<PromptKind, String>,
}

impl ToGConfig {
    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// `load(path)` when a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        let e = &self.engine;
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };
        if e.default_max_width == 0 {
            return invalid("engine.default_max_width must be at least 1");
        }
        if e.candidate_cap == 0 {
            return invalid("engine.candidate_cap must be at least 1");
        }
        if e.neighbor_limit == 0 {
            return invalid("engine.neighbor_limit must be at least 1");
        }
        if !e.linking_threshold.is_finite() || e.linking_threshold < 0.0 {
            return invalid("engine.linking_threshold must be a non-negative number");
        }
        if self.graph.backend == GraphBackend::Neo4j && self.graph.url.trim().is_empty() {
            return invalid("graph.url is required for the neo4j backend");
        }
        if self.index.embedder == EmbedderKind::Hashed && self.index.hashed_dim == 0 {
            return invalid("index.hashed_dim must be at least 1");
        }
        Ok(())
    }

    /// Default templates with the `[prompts]` overrides applied.
    pub fn prompt_templates(&self) -> PromptTemplates {
        PromptTemplates::with_overrides(&self.prompts)
    }

    /// Open the configured graph store.
    pub fn open_store(&self) -> ToGResult<Arc<dyn GraphStore>> {
        match self.graph.backend {
            GraphBackend::Memory => {
                let graph = match &self.graph.snapshot {
                    Some(path) => MemoryGraph::from_snapshot_file(path)?,
                    None => MemoryGraph::new(),
                };
                tracing::info!(
                    nodes = graph.node_count(),
                    edges = graph.edge_count(),
                    "memory graph ready"
                );
                Ok(Arc::new(graph))
            }
            GraphBackend::Neo4j => {
                let store = Neo4jHttpStore::new(self.graph.neo4j());
                tracing::info!(url = %self.graph.url, database = %self.graph.database, "neo4j store");
                Ok(Arc::new(store))
            }
        }
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        match self.index.embedder {
            EmbedderKind::Ollama => Arc::new(OllamaClient::new(self.llm.clone())),
            EmbedderKind::Hashed => Arc::new(HashedEmbedder::new(self.index.hashed_dim)),
        }
    }

    /// Load the name index for `partition`, if one is configured.
    ///
    /// A missing or unreadable index is logged and linking stays lexical.
    pub fn load_index(&self, partition: &PartitionKey) -> Option<NameIndex> {
        let path = self.index.path.as_ref()?;
        match NameIndex::load(path, partition, self.embedder()) {
            Ok(index) => {
                tracing::info!(path = %path.display(), names = index.len(), "name index loaded");
                Some(index)
            }
            Err(e) => {
                tracing::warn!(error = %e, "name index unavailable, linking lexically");
                None
            }
        }
    }

    /// Assemble an engine for `partition` with the given chat model.
    pub fn build_engine(
        &self,
        partition: PartitionKey,
        chat: Arc<dyn ChatClient>,
    ) -> ToGResult<ToGEngine> {
        self.validate()?;
        let store = self.open_store()?;
        let index = self.load_index(&partition);
        let engine = ToGEngine::new(self.engine.clone(), partition, store, chat)
            .with_prompts(self.prompt_templates());
        Ok(match index {
            Some(index) => engine.with_retriever(Arc::new(index)),
            None => engine,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: ToGConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, ToGConfig::default());
        assert_eq!(cfg.graph.backend, GraphBackend::Memory);
        assert_eq!(cfg.engine.linking_threshold, 1.0);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: ToGConfig = toml::from_str(
            r#"
            [engine]
            default_max_width = 5

            [graph]
            backend = "neo4j"
            database = "plants"

            [prompts]
            answer_generation = "Answer {question} from {paths}"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.engine.default_max_width, 5);
        assert_eq!(cfg.engine.default_max_depth, 3);
        assert_eq!(cfg.graph.neo4j().database, "plants");
        assert_eq!(cfg.graph.neo4j().url, "http://localhost:7474");
        let rendered = cfg.prompt_templates().render(
            PromptKind::AnswerGeneration,
            &[("question", "q"), ("paths", "p")],
        );
        assert_eq!(rendered, "Answer q from p");
    }

    #[test]
    fn config_roundtrip_toml() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("tog.toml");

        let mut cfg = ToGConfig::default();
        cfg.engine.allow_cycles = true;
        cfg.index.path = Some(PathBuf::from("names.idx"));
        cfg.index.embedder = EmbedderKind::Hashed;
        cfg.save(&path).unwrap();

        let loaded = ToGConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn zero_width_is_invalid() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[engine]\ndefault_max_width = 0\n").unwrap();
        assert!(matches!(
            ToGConfig::load(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[engine\n").unwrap();
        assert!(matches!(ToGConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn missing_index_links_lexically() {
        let mut cfg = ToGConfig::default();
        cfg.index.path = Some(PathBuf::from("/nonexistent/names.idx"));
        cfg.index.embedder = EmbedderKind::Hashed;
        let p = PartitionKey::new("kb").unwrap();
        assert!(cfg.load_index(&p).is_none());

        let chat = Arc::new(crate::llm::ScriptedChat::new());
        let engine = cfg.build_engine(p, chat).unwrap();
        assert!(!engine.linker().has_retriever());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        assert!(matches!(
            ToGConfig::load(Path::new("/nonexistent/tog.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
