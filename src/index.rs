//! Vector index capability and an in-memory implementation.
//!
//! The curation core only consumes an index through [`VectorIndex`]:
//! - `ids` enumerates the id space the strategies sample from.
//! - `get_by_ids` returns stored embeddings and metadata.
//! - `query_nearest` turns a vector into a ranked candidate list.
//! - `upsert` is called on the core's behalf by ingestion.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use crate::data::Item;
use crate::errors::CurationError;
use crate::transport::fs::write_atomic;
use crate::types::{ItemId, Locator};

/// Index capability consumed by strategies, neighbor resolution, and ingestion.
pub trait VectorIndex: Send + Sync {
    /// All ids currently stored, in a stable order.
    fn ids(&self) -> Result<Vec<ItemId>, CurationError>;

    /// Items for `ids` with embeddings and metadata. Unknown ids are omitted;
    /// the returned order follows `ids`.
    fn get_by_ids(&self, ids: &[ItemId]) -> Result<Vec<Item>, CurationError>;

    /// Up to `k` items ordered by ascending distance to `embedding`.
    ///
    /// Returned items carry id, locator, and metadata; embeddings may be empty.
    fn query_nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<Item>, CurationError>;

    /// Insert or replace items by id.
    fn upsert(&self, items: Vec<Item>) -> Result<(), CurationError>;

    /// Number of stored items.
    fn count(&self) -> Result<usize, CurationError> {
        Ok(self.ids()?.len())
    }

    /// Set of locators already present in the index.
    fn locators(&self) -> Result<HashSet<Locator>, CurationError> {
        let ids = self.ids()?;
        Ok(self
            .get_by_ids(&ids)?
            .into_iter()
            .map(|item| item.locator)
            .collect())
    }
}

/// Distance used by [`InMemoryVectorIndex`] to rank neighbors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cosine_similarity`.
    #[default]
    Cosine,
    /// Squared euclidean distance.
    L2,
    /// `1 - dot(a, b)`.
    InnerProduct,
}

impl DistanceMetric {
    /// Distance between `a` and `b` under this metric (smaller is closer).
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
            DistanceMetric::L2 => squared_euclidean(a, b),
            DistanceMetric::InnerProduct => 1.0 - dot(a, b),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub(crate) fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut sum_a = 0.0f32;
    let mut sum_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        sum_a += x * x;
        sum_b += y * y;
    }

    if sum_a <= f32::EPSILON || sum_b <= f32::EPSILON {
        0.0
    } else {
        dot / (sum_a.sqrt() * sum_b.sqrt())
    }
}

/// Serialized form of an [`InMemoryVectorIndex`].
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    #[serde(default)]
    metric: DistanceMetric,
    items: Vec<Item>,
}

/// Brute-force in-memory index with insertion-ordered storage.
///
/// Ties in distance keep insertion order, so query results are deterministic.
pub struct InMemoryVectorIndex {
    metric: DistanceMetric,
    items: RwLock<IndexMap<ItemId, Item>>,
}

impl InMemoryVectorIndex {
    /// Create an empty index ranking by `metric`.
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            items: RwLock::new(IndexMap::new()),
        }
    }

    /// Create an index pre-populated with `items` (later duplicates replace earlier ones).
    pub fn with_items<I>(metric: DistanceMetric, items: I) -> Self
    where
        I: IntoIterator<Item = Item>,
    {
        let map = items
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();
        Self {
            metric,
            items: RwLock::new(map),
        }
    }

    /// Configured distance metric.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Load an index from a JSON file written by [`InMemoryVectorIndex::save`].
    pub fn load(path: &Path) -> Result<Self, CurationError> {
        let raw = fs::read_to_string(path)?;
        let file: IndexFile = serde_json::from_str(&raw).map_err(|err| {
            CurationError::Persistence(format!(
                "failed to decode index file {}: {err}",
                path.display()
            ))
        })?;
        Ok(Self::with_items(file.metric, file.items))
    }

    /// Persist the whole index as JSON, replacing `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), CurationError> {
        let items = self
            .items
            .read()
            .expect("vector index poisoned")
            .values()
            .cloned()
            .collect();
        let file = IndexFile {
            metric: self.metric,
            items,
        };
        let payload = serde_json::to_vec(&file)?;
        write_atomic(path, &payload)
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn ids(&self) -> Result<Vec<ItemId>, CurationError> {
        Ok(self
            .items
            .read()
            .expect("vector index poisoned")
            .keys()
            .cloned()
            .collect())
    }

    fn get_by_ids(&self, ids: &[ItemId]) -> Result<Vec<Item>, CurationError> {
        let items = self.items.read().expect("vector index poisoned");
        Ok(ids.iter().filter_map(|id| items.get(id).cloned()).collect())
    }

    fn query_nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<Item>, CurationError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let items = self.items.read().expect("vector index poisoned");
        let mut ranked: Vec<(f32, &Item)> = items
            .values()
            .filter(|item| !item.embedding.is_empty())
            .map(|item| (self.metric.distance(embedding, &item.embedding), item))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(ranked
            .into_iter()
            .take(k)
            .map(|(_, item)| Item {
                id: item.id.clone(),
                locator: item.locator.clone(),
                embedding: Vec::new(),
                metadata: item.metadata.clone(),
            })
            .collect())
    }

    fn upsert(&self, items: Vec<Item>) -> Result<(), CurationError> {
        if let Some(item) = items.iter().find(|item| item.embedding.is_empty()) {
            return Err(CurationError::index(format!(
                "refusing to upsert item '{}' without an embedding",
                item.id
            )));
        }
        let mut guard = self.items.write().expect("vector index poisoned");
        for item in items {
            guard.insert(item.id.clone(), item);
        }
        Ok(())
    }

    fn count(&self) -> Result<usize, CurationError> {
        Ok(self.items.read().expect("vector index poisoned").len())
    }
}
