//! Sampling strategies and the public sampling API.
//!
//! Ownership model:
//! - `SamplingStrategy` is the closed set of strategy variants. Each owns its
//!   eligible pool and removes a main id from it at draw time.
//! - `NeighborSampler` pairs a strategy with the index, the exclusion set, and
//!   neighbor resolution. It is single-writer: `sample` and `exclude` both take
//!   `&mut self`.

use indexmap::{IndexMap, IndexSet};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cluster::{KMeans, KMeansConfig, TrainSize};
use crate::config::{SamplerConfig, StrategyConfig};
use crate::constants::sampler::{CLUSTER_LABEL_PREFIX, STRATUM_LABEL_DELIMITER};
use crate::data::{Metadata, SampleResult};
use crate::errors::CurationError;
use crate::exclusion::ExclusionSet;
use crate::index::VectorIndex;
use crate::metrics::{CoverageSkew, coverage_skew};
use crate::neighbors::NeighborResolver;
use crate::types::{ItemId, MetaField, StratumLabel};

/// Numeric stratum key: one dictionary code per metadata field, or a single cluster index.
pub type StratumKey = Vec<u32>;

/// Uniform pool: every eligible id is equally likely.
#[derive(Clone, Debug, Default)]
pub struct UniformPool {
    ids: Vec<ItemId>,
}

impl UniformPool {
    /// Create a pool over `ids` (duplicates collapse).
    pub fn new(ids: impl IntoIterator<Item = ItemId>) -> Self {
        let unique: IndexSet<ItemId> = ids.into_iter().collect();
        Self {
            ids: unique.into_iter().collect(),
        }
    }

    fn take<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<ItemId> {
        if self.ids.is_empty() {
            return None;
        }
        let idx = rng.random_range(0..self.ids.len());
        Some(self.ids.swap_remove(idx))
    }

    fn exclude(&mut self, ids: &HashSet<ItemId>) {
        self.ids.retain(|id| !ids.contains(id));
    }

    /// Number of eligible ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` when nothing is eligible.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Pool grouped into strata; draws pick a stratum uniformly, then an id uniformly within it.
///
/// Strata are not weighted by population, so small strata are over-sampled
/// relative to raw frequency. Membership is rebuilt from the remaining pool
/// after every exclusion batch.
#[derive(Clone, Debug, Default)]
pub struct StratifiedPool {
    keys: HashMap<ItemId, StratumKey>,
    eligible: IndexSet<ItemId>,
    strata: IndexMap<StratumKey, Vec<ItemId>>,
}

impl StratifiedPool {
    /// Build a pool from `(id, stratum key)` pairs; a repeated id keeps its first key.
    pub fn from_keys(entries: impl IntoIterator<Item = (ItemId, StratumKey)>) -> Self {
        let mut keys = HashMap::new();
        let mut eligible = IndexSet::new();
        for (id, key) in entries {
            if eligible.insert(id.clone()) {
                keys.insert(id, key);
            }
        }
        let mut pool = Self {
            keys,
            eligible,
            strata: IndexMap::new(),
        };
        pool.rebuild();
        pool
    }

    fn rebuild(&mut self) {
        let mut strata: IndexMap<StratumKey, Vec<ItemId>> = IndexMap::new();
        for id in &self.eligible {
            if let Some(key) = self.keys.get(id) {
                strata.entry(key.clone()).or_default().push(id.clone());
            }
        }
        self.strata = strata;
    }

    /// Uniform over non-empty strata; stratum size plays no part.
    fn pick_stratum<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        if self.strata.is_empty() {
            return None;
        }
        Some(rng.random_range(0..self.strata.len()))
    }

    /// Pick one non-empty stratum uniformly at random without consuming anything.
    pub fn draw_stratum<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&StratumKey> {
        let idx = self.pick_stratum(rng)?;
        self.strata.get_index(idx).map(|(key, _)| key)
    }

    fn take<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<(ItemId, StratumKey)> {
        let stratum_idx = self.pick_stratum(rng)?;
        let (key, members) = self.strata.get_index_mut(stratum_idx)?;
        let key = key.clone();
        let member_idx = rng.random_range(0..members.len());
        let id = members.swap_remove(member_idx);
        if members.is_empty() {
            self.strata.swap_remove_index(stratum_idx);
        }
        self.eligible.swap_remove(&id);
        Some((id, key))
    }

    fn exclude(&mut self, ids: &HashSet<ItemId>) {
        self.eligible.retain(|id| !ids.contains(id));
        self.rebuild();
    }

    /// Number of eligible ids.
    pub fn len(&self) -> usize {
        self.eligible.len()
    }

    /// Returns `true` when nothing is eligible.
    pub fn is_empty(&self) -> bool {
        self.eligible.is_empty()
    }

    /// Number of strata with at least one eligible member.
    pub fn stratum_count(&self) -> usize {
        self.strata.len()
    }

    /// Eligible member count per stratum.
    pub fn stratum_sizes(&self) -> impl Iterator<Item = (&StratumKey, usize)> {
        self.strata.iter().map(|(key, members)| (key, members.len()))
    }

    /// Stratum key recorded for `id`, if it was ever part of the pool.
    pub fn key_for(&self, id: &str) -> Option<&StratumKey> {
        self.keys.get(id)
    }
}

/// Incremental per-field value dictionaries mapping metadata tuples to stratum keys.
#[derive(Clone, Debug)]
pub struct StratumCodec {
    fields: Vec<MetaField>,
    dictionaries: Vec<IndexMap<String, u32>>,
}

impl StratumCodec {
    /// Create a codec over `fields` (order defines key positions).
    pub fn new(fields: Vec<MetaField>) -> Self {
        let dictionaries = vec![IndexMap::new(); fields.len()];
        Self {
            fields,
            dictionaries,
        }
    }

    /// Encode `metadata`, assigning the next free code to each value seen for the first time.
    ///
    /// Missing fields encode as JSON `null`.
    pub fn encode(&mut self, metadata: &Metadata) -> StratumKey {
        self.fields
            .iter()
            .zip(self.dictionaries.iter_mut())
            .map(|(field, dictionary)| {
                let rendered = render_value(metadata.get(field).unwrap_or(&Value::Null));
                let next = dictionary.len() as u32;
                *dictionary.entry(rendered).or_insert(next)
            })
            .collect()
    }

    /// Render `key` as `field=value|field=value`.
    pub fn label(&self, key: &StratumKey) -> StratumLabel {
        self.fields
            .iter()
            .zip(self.dictionaries.iter())
            .zip(key.iter())
            .map(|((field, dictionary), code)| {
                let value = dictionary
                    .get_index(*code as usize)
                    .map(|(value, _)| value.as_str())
                    .unwrap_or("?");
                format!("{field}={value}")
            })
            .collect::<Vec<_>>()
            .join(STRATUM_LABEL_DELIMITER)
    }

    /// Number of distinct values seen per field.
    pub fn cardinalities(&self) -> Vec<usize> {
        self.dictionaries.iter().map(IndexMap::len).collect()
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Closed set of sampling strategy variants sharing one `take`/`exclude` contract.
#[derive(Clone, Debug)]
pub enum SamplingStrategy {
    /// Uniform draw over the eligible pool.
    Uniform(UniformPool),
    /// Strata derived from a tuple of categorical metadata values.
    MetadataStratified {
        /// Stratified eligible pool.
        pool: StratifiedPool,
        /// Value dictionaries used to build stratum keys.
        codec: StratumCodec,
    },
    /// Strata derived from the nearest fitted k-means centroid.
    ClusterStratified {
        /// Stratified eligible pool.
        pool: StratifiedPool,
        /// Fitted clustering model.
        model: KMeans,
    },
}

impl SamplingStrategy {
    /// Build the configured strategy over every id in `index`.
    ///
    /// Invalid configuration fails here, before any sampling occurs.
    pub fn build<R: Rng + ?Sized>(
        index: &dyn VectorIndex,
        config: &StrategyConfig,
        rng: &mut R,
    ) -> Result<Self, CurationError> {
        config.validate()?;
        let ids = index.ids()?;
        match config {
            StrategyConfig::Uniform => Ok(SamplingStrategy::Uniform(UniformPool::new(ids))),
            StrategyConfig::MetadataStratified { meta_fields } => {
                let mut codec = StratumCodec::new(meta_fields.clone());
                let entries: Vec<(ItemId, StratumKey)> = index
                    .get_by_ids(&ids)?
                    .into_iter()
                    .map(|item| {
                        let key = codec.encode(&item.metadata);
                        (item.id, key)
                    })
                    .collect();
                let pool = StratifiedPool::from_keys(entries);
                info!(
                    "[curator:sampler] metadata strata built: {} ids across {} strata (field cardinalities {:?})",
                    pool.len(),
                    pool.stratum_count(),
                    codec.cardinalities()
                );
                Ok(SamplingStrategy::MetadataStratified { pool, codec })
            }
            StrategyConfig::ClusterStratified {
                n_clusters,
                max_iter,
                train_size,
            } => {
                let kmeans = KMeansConfig {
                    n_clusters: *n_clusters,
                    max_iter: *max_iter,
                };
                Self::build_clustered(index, ids, kmeans, *train_size, rng)
            }
        }
    }

    fn build_clustered<R: Rng + ?Sized>(
        index: &dyn VectorIndex,
        ids: Vec<ItemId>,
        kmeans: KMeansConfig,
        train_size: TrainSize,
        rng: &mut R,
    ) -> Result<Self, CurationError> {
        let train_count = train_size.resolve(ids.len())?;
        let train_ids: Vec<ItemId> = ids.choose_multiple(rng, train_count).cloned().collect();
        let train_data: Vec<Vec<f32>> = index
            .get_by_ids(&train_ids)?
            .into_iter()
            .map(|item| item.embedding)
            .collect();
        let model = KMeans::fit(&train_data, kmeans, rng)?;
        info!(
            "[curator:sampler] k-means fitted on {} ids: k={}, iterations={}, converged={}",
            train_data.len(),
            kmeans.n_clusters,
            model.iterations(),
            model.converged()
        );

        let entries: Vec<(ItemId, StratumKey)> = index
            .get_by_ids(&ids)?
            .into_iter()
            .map(|item| {
                let cluster = model.predict(&item.embedding) as u32;
                (item.id, vec![cluster])
            })
            .collect();
        let pool = StratifiedPool::from_keys(entries);
        info!(
            "[curator:sampler] cluster strata built: {} ids across {} non-empty clusters",
            pool.len(),
            pool.stratum_count()
        );
        Ok(SamplingStrategy::ClusterStratified { pool, model })
    }

    /// Remove and return one eligible main id, with its stratum label when stratified.
    fn take<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<(ItemId, Option<StratumLabel>)> {
        match self {
            SamplingStrategy::Uniform(pool) => pool.take(rng).map(|id| (id, None)),
            SamplingStrategy::MetadataStratified { pool, codec } => pool
                .take(rng)
                .map(|(id, key)| (id, Some(codec.label(&key)))),
            SamplingStrategy::ClusterStratified { pool, .. } => pool
                .take(rng)
                .map(|(id, key)| (id, Some(cluster_label(&key)))),
        }
    }

    fn exclude(&mut self, ids: &HashSet<ItemId>) {
        match self {
            SamplingStrategy::Uniform(pool) => pool.exclude(ids),
            SamplingStrategy::MetadataStratified { pool, .. }
            | SamplingStrategy::ClusterStratified { pool, .. } => pool.exclude(ids),
        }
    }

    /// Number of ids still eligible to be drawn as a main item.
    pub fn eligible_len(&self) -> usize {
        match self {
            SamplingStrategy::Uniform(pool) => pool.len(),
            SamplingStrategy::MetadataStratified { pool, .. }
            | SamplingStrategy::ClusterStratified { pool, .. } => pool.len(),
        }
    }

    /// Short variant name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SamplingStrategy::Uniform(_) => "uniform",
            SamplingStrategy::MetadataStratified { .. } => "metadata_stratified",
            SamplingStrategy::ClusterStratified { .. } => "cluster_stratified",
        }
    }
}

fn cluster_label(key: &StratumKey) -> StratumLabel {
    let cluster = key.first().copied().unwrap_or_default();
    format!("{CLUSTER_LABEL_PREFIX}{cluster}")
}

/// Draws main items and their nearest neighbors while honoring exclusions.
pub struct NeighborSampler {
    index: Arc<dyn VectorIndex>,
    strategy: SamplingStrategy,
    exclusions: ExclusionSet,
    resolver: NeighborResolver,
    rng: StdRng,
    meta_fields: Option<Vec<MetaField>>,
    draws: HashMap<StratumLabel, usize>,
}

impl NeighborSampler {
    /// Build a sampler over `index` with `config`. Fails fast on invalid strategy config.
    pub fn new(index: Arc<dyn VectorIndex>, config: SamplerConfig) -> Result<Self, CurationError> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let strategy = SamplingStrategy::build(index.as_ref(), &config.strategy, &mut rng)?;
        info!(
            "[curator:sampler] {} strategy ready with {} eligible ids",
            strategy.name(),
            strategy.eligible_len()
        );
        Ok(Self {
            index,
            strategy,
            exclusions: ExclusionSet::new(),
            resolver: NeighborResolver::new(config.self_match),
            rng,
            meta_fields: config.meta_fields,
            draws: HashMap::new(),
        })
    }

    /// Draw one main item and up to `k` neighbors.
    ///
    /// Returns `Ok(None)` once the eligible pool is empty. Ids that vanished
    /// from the index since construction are skipped with a warning.
    pub fn sample(&mut self, k: usize) -> Result<Option<SampleResult>, CurationError> {
        loop {
            let Some((main_id, stratum)) = self.strategy.take(&mut self.rng) else {
                return Ok(None);
            };
            let Some(main) = self
                .index
                .get_by_ids(std::slice::from_ref(&main_id))?
                .into_iter()
                .next()
            else {
                warn!(
                    "[curator:sampler] id '{}' no longer present in index, skipping",
                    main_id
                );
                continue;
            };
            let mut result = self.resolver.resolve(self.index.as_ref(), main, k)?;
            if let Some(fields) = &self.meta_fields {
                result.main.project_metadata(fields);
                for neighbor in &mut result.neighbors {
                    neighbor.project_metadata(fields);
                }
            }
            if let Some(label) = stratum {
                debug!(
                    "[curator:sampler] drew '{}' from stratum {} with {} neighbors",
                    main_id,
                    label,
                    result.neighbors.len()
                );
                *self.draws.entry(label).or_default() += 1;
            } else {
                debug!(
                    "[curator:sampler] drew '{}' with {} neighbors",
                    main_id,
                    result.neighbors.len()
                );
            }
            return Ok(Some(result));
        }
    }

    /// Permanently exclude `ids` from being drawn as main items.
    ///
    /// Already-excluded or unknown ids are no-ops. Returns the number of newly excluded ids.
    pub fn exclude<'a, I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a ItemId>,
    {
        let added = self.exclusions.extend(ids);
        if added.is_empty() {
            return 0;
        }
        let before = self.strategy.eligible_len();
        let batch: HashSet<ItemId> = added.iter().cloned().collect();
        self.strategy.exclude(&batch);
        debug!(
            "[curator:sampler] excluded {} ids, eligible {} -> {}",
            added.len(),
            before,
            self.strategy.eligible_len()
        );
        added.len()
    }

    /// Number of ids still eligible as main items.
    pub fn eligible_len(&self) -> usize {
        self.strategy.eligible_len()
    }

    /// Ids excluded so far in this process.
    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    /// Active strategy variant.
    pub fn strategy(&self) -> &SamplingStrategy {
        &self.strategy
    }

    /// Stratum coverage over all draws so far; `None` for uniform or before any draw.
    pub fn coverage(&self) -> Option<CoverageSkew> {
        coverage_skew(&self.draws)
    }
}
