use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use crate::types::{Embedding, ItemId, Locator};

/// Ordered item metadata as stored in the index.
pub type Metadata = IndexMap<String, Value>;

/// An embedded item read from the vector index.
///
/// Items are never mutated by sampling or export; they are only read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Index-assigned identity.
    pub id: ItemId,
    /// Content locator (usually a URL) used to fetch the payload.
    pub locator: Locator,
    /// Stored embedding. Empty for neighbor results, which the index returns without vectors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Embedding,
    /// Ordered metadata mapping.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Item {
    /// Keep only `fields`, in the given order; absent fields become `null`.
    pub fn project_metadata(&mut self, fields: &[String]) {
        let projected = fields
            .iter()
            .map(|field| {
                (
                    field.clone(),
                    self.metadata.get(field).cloned().unwrap_or(Value::Null),
                )
            })
            .collect();
        self.metadata = projected;
    }
}

/// One sampled unit: the main item plus its nearest neighbors, closest first.
///
/// `main` never appears in `neighbors`, and `neighbors.len()` never exceeds
/// the requested count.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleResult {
    /// Anchor item of the unit.
    pub main: Item,
    /// Neighbor candidates in index similarity order.
    pub neighbors: Vec<Item>,
}

impl SampleResult {
    /// Main item followed by neighbors; position 0 is always the main item.
    pub fn members(&self) -> impl Iterator<Item = &Item> {
        std::iter::once(&self.main).chain(self.neighbors.iter())
    }
}

/// One exported annotation unit as recorded by the export workflow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryBatch {
    /// Attempt index used as the directory name prefix.
    pub index: usize,
    /// Main item id; also the manifest key.
    pub main_id: ItemId,
    /// Successfully fetched member ids, main first.
    pub members: Vec<ItemId>,
}

/// Result of one completed labeling unit.
///
/// `pos` holds ids judged to match the main item; `neg` holds rejected ids.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    /// Ids kept by the curator.
    pub pos: Vec<ItemId>,
    /// Ids removed by the curator.
    pub neg: Vec<ItemId>,
}

impl AnnotationRecord {
    /// Returns `true` when the record carries no decisions.
    pub fn is_empty(&self) -> bool {
        self.pos.is_empty() && self.neg.is_empty()
    }
}
