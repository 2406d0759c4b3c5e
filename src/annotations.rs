//! Persisted annotation log.
//!
//! The log is an ordered JSON array of `{"pos": [...], "neg": [...]}` records.
//! It is read once when opened and rewritten wholesale on every save; writers
//! across processes must be serialized externally.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::data::AnnotationRecord;
use crate::errors::CurationError;
use crate::transport::fs::write_json_atomic;
use crate::types::ItemId;

/// In-memory view of the annotation log plus the derived annotated-id set.
#[derive(Debug)]
pub struct AnnotationLog {
    path: PathBuf,
    records: Vec<AnnotationRecord>,
    annotated: HashSet<ItemId>,
}

impl AnnotationLog {
    /// Open the log at `path`, creating it as an empty array when missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CurationError> {
        let path = path.into();
        if !path.exists() {
            info!(
                "[curator:annotations] no log at {}; creating an empty one",
                path.display()
            );
            let log = Self {
                path,
                records: Vec::new(),
                annotated: HashSet::new(),
            };
            log.save()?;
            return Ok(log);
        }
        let raw = fs::read_to_string(&path)?;
        let records: Vec<AnnotationRecord> = serde_json::from_str(&raw).map_err(|err| {
            CurationError::Persistence(format!(
                "failed to decode annotation log {}: {err}",
                path.display()
            ))
        })?;
        let annotated = records
            .iter()
            .flat_map(|record| record.pos.iter().cloned())
            .collect();
        Ok(Self {
            path,
            records,
            annotated,
        })
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records in append order.
    pub fn records(&self) -> &[AnnotationRecord] {
        &self.records
    }

    /// Union of every record's `pos` ids.
    pub fn annotated_ids(&self) -> &HashSet<ItemId> {
        &self.annotated
    }

    /// Whether `id` appears in any record's `pos`.
    pub fn is_annotated(&self, id: &str) -> bool {
        self.annotated.contains(id)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append one record in memory and fold its `pos` ids into the annotated set.
    pub fn append(&mut self, record: AnnotationRecord) {
        self.annotated.extend(record.pos.iter().cloned());
        self.records.push(record);
    }

    /// Rewrite the backing file with every record.
    pub fn save(&self) -> Result<(), CurationError> {
        write_json_atomic(&self.path, &self.records)
    }
}
