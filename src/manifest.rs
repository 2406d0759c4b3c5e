use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::layout::MANIFEST_FILENAME;
use crate::errors::CurationError;
use crate::transport::fs::write_json_atomic;
use crate::types::ItemId;

/// Persisted mapping from main id to the ordered member ids of its exported unit.
///
/// Position 0 of every member list is the main id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SamplesManifest {
    entries: IndexMap<ItemId, Vec<ItemId>>,
}

impl SamplesManifest {
    /// Empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Manifest location inside an export root.
    pub fn path_in(root: &Path) -> PathBuf {
        root.join(MANIFEST_FILENAME)
    }

    /// Record the members of one unit. Replaces an earlier entry for the same main id.
    pub fn insert(&mut self, main_id: ItemId, members: Vec<ItemId>) {
        self.entries.insert(main_id, members);
    }

    /// Expected members for `main_id`.
    pub fn members(&self, main_id: &str) -> Option<&[ItemId]> {
        self.entries.get(main_id).map(Vec::as_slice)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, &Vec<ItemId>)> {
        self.entries.iter()
    }

    /// Number of recorded units.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no unit was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read a manifest previously written by [`SamplesManifest::save`].
    pub fn load(path: &Path) -> Result<Self, CurationError> {
        let raw = fs::read_to_string(path).map_err(|err| {
            CurationError::Persistence(format!(
                "failed to read manifest {}: {err}",
                path.display()
            ))
        })?;
        serde_json::from_str(&raw).map_err(|err| {
            CurationError::Persistence(format!(
                "failed to decode manifest {}: {err}",
                path.display()
            ))
        })
    }

    /// Write the manifest as indented JSON.
    pub fn save(&self, path: &Path) -> Result<(), CurationError> {
        write_json_atomic(path, self)
    }
}
