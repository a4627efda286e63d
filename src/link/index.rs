//! Dense name index: HNSW over node-name embeddings.
//!
//! The index file is a bincode-encoded [`IndexFile`] holding one partition's
//! names with their vectors. Stored and query vectors are L2-normalized
//! before they reach HNSW, so reported distances lie in `[0, 2]` whatever the
//! embedder's own scale. The engine only reads it; building one from a
//! list of names is provided for tooling and tests.

use std::path::Path;
use std::sync::{Arc, RwLock};

use anndists::dist::DistL2;
use hnsw_rs::hnsw::Hnsw;
use serde::{Deserialize, Serialize};

use crate::error::LinkError;
use crate::llm::Embedder;
use crate::partition::PartitionKey;

use super::DenseRetriever;

/// One indexed name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub vector: Vec<f32>,
}

/// On-disk layout of a persisted name index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
    pub partition: String,
    pub dim: usize,
    pub entries: Vec<IndexEntry>,
}

/// k-NN index over entity names with L2 distance.
pub struct NameIndex {
    hnsw: RwLock<Hnsw<'static, f32, DistL2>>,
    entries: Vec<IndexEntry>,
    dim: usize,
    embedder: Arc<dyn Embedder>,
}

// Safety: Hnsw uses internal synchronization; the RwLock wrapper provides
// the outer synchronization.
unsafe impl Send for NameIndex {}
unsafe impl Sync for NameIndex {}

impl NameIndex {
    /// Build an index from precomputed vectors.
    pub fn from_entries(
        dim: usize,
        mut entries: Vec<IndexEntry>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, LinkError> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dim) {
            return Err(LinkError::DimensionMismatch {
                expected: dim,
                actual: bad.vector.len(),
            });
        }

        for entry in &mut entries {
            to_unit(&mut entry.vector);
        }

        let max_elements = entries.len().max(16);
        let max_layer = (max_elements as f64).log2().ceil() as usize;
        let max_layer = max_layer.clamp(4, 16);
        let hnsw = Hnsw::new(16, max_elements, max_layer, 200, DistL2 {});
        for (id, entry) in entries.iter().enumerate() {
            hnsw.insert((entry.vector.as_slice(), id));
        }

        tracing::debug!(names = entries.len(), dim, "name index built");
        Ok(Self {
            hnsw: RwLock::new(hnsw),
            entries,
            dim,
            embedder,
        })
    }

    /// Embed every name and index it.
    pub fn build(names: &[String], embedder: Arc<dyn Embedder>) -> Result<Self, LinkError> {
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let vector = embedder.embed(name).map_err(|e| LinkError::Embedding {
                message: e.to_string(),
            })?;
            entries.push(IndexEntry {
                name: name.clone(),
                vector,
            });
        }
        let dim = entries.first().map(|e| e.vector.len()).unwrap_or(0);
        Self::from_entries(dim, entries, embedder)
    }

    /// Load a persisted index for `partition`.
    pub fn load(
        path: &Path,
        partition: &PartitionKey,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, LinkError> {
        let bytes = std::fs::read(path).map_err(|e| LinkError::IndexUnavailable {
            message: format!("{}: {e}", path.display()),
        })?;
        let file: IndexFile =
            bincode::deserialize(&bytes).map_err(|e| LinkError::IndexUnavailable {
                message: format!("{}: {e}", path.display()),
            })?;
        if file.partition != partition.as_str() {
            return Err(LinkError::IndexUnavailable {
                message: format!(
                    "{} indexes partition \"{}\", not \"{partition}\"",
                    path.display(),
                    file.partition
                ),
            });
        }
        Self::from_entries(file.dim, file.entries, embedder)
    }

    /// Persist the index for `partition`.
    pub fn save(&self, path: &Path, partition: &PartitionKey) -> Result<(), LinkError> {
        let file = IndexFile {
            partition: partition.as_str().to_string(),
            dim: self.dim,
            entries: self.entries.clone(),
        };
        let bytes = bincode::serialize(&file).map_err(|e| LinkError::IndexUnavailable {
            message: e.to_string(),
        })?;
        std::fs::write(path, bytes).map_err(|e| LinkError::IndexUnavailable {
            message: format!("{}: {e}", path.display()),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

impl DenseRetriever for NameIndex {
    fn top1(&self, query: &str) -> Result<Option<(String, f32)>, LinkError> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let mut vector = self.embedder.embed(query).map_err(|e| LinkError::Embedding {
            message: e.to_string(),
        })?;
        if vector.len() != self.dim {
            return Err(LinkError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        to_unit(&mut vector);

        let hnsw = self.hnsw.read().map_err(|_| LinkError::HnswError {
            message: "HNSW lock poisoned".into(),
        })?;
        let best = hnsw
            .search(&vector, 1, 32)
            .into_iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance));

        Ok(best.and_then(|n| {
            self.entries
                .get(n.d_id)
                .map(|e| (e.name.clone(), n.distance))
        }))
    }
}

/// Scale to unit L2 length in place. Zero vectors are left as they are.
fn to_unit(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

impl std::fmt::Debug for NameIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameIndex")
            .field("names", &self.entries.len())
            .field("dim", &self.dim)
            .finish()
    }
}
