use serde::{Deserialize, Serialize};

use crate::constants::sampler::SELF_MATCH_OVERFETCH;
use crate::data::{Item, SampleResult};
use crate::errors::CurationError;
use crate::index::VectorIndex;

/// Rule used to recognize the main item inside its own neighbor list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfMatch {
    /// Drop every neighbor whose locator equals the main item's locator.
    ///
    /// Distinct ids pointing at the same content are dropped as well.
    #[default]
    Locator,
    /// Drop only the neighbor whose id equals the main item's id.
    Id,
}

impl SelfMatch {
    fn is_self(self, main: &Item, candidate: &Item) -> bool {
        match self {
            SelfMatch::Locator => candidate.locator == main.locator,
            SelfMatch::Id => candidate.id == main.id,
        }
    }
}

/// Turns a main item into a `(main, neighbors)` pair with one index query.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeighborResolver {
    self_match: SelfMatch,
}

impl NeighborResolver {
    /// Create a resolver using `self_match` to filter the main item out.
    pub fn new(self_match: SelfMatch) -> Self {
        Self { self_match }
    }

    /// Configured self-match rule.
    pub fn self_match(&self) -> SelfMatch {
        self.self_match
    }

    /// Query `k + 1` neighbors of `main`, drop self matches, and keep at most `k`.
    ///
    /// Fewer than `k` neighbors are returned when the index runs short; the
    /// result is never padded.
    pub fn resolve(
        &self,
        index: &dyn VectorIndex,
        main: Item,
        k: usize,
    ) -> Result<SampleResult, CurationError> {
        if main.embedding.is_empty() {
            return Err(CurationError::index(format!(
                "item '{}' has no stored embedding",
                main.id
            )));
        }
        let candidates = index.query_nearest(&main.embedding, k + SELF_MATCH_OVERFETCH)?;
        let neighbors = candidates
            .into_iter()
            .filter(|candidate| !self.self_match.is_self(&main, candidate))
            .take(k)
            .collect();
        Ok(SampleResult { main, neighbors })
    }
}
