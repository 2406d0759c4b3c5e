use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cluster::{KMeansConfig, TrainSize};
use crate::constants::fetch::{DEFAULT_MAX_IN_FLIGHT, DEFAULT_TIMEOUT_SECS};
use crate::constants::ingest::DEFAULT_BATCH_SIZE;
use crate::constants::layout::{DEFAULT_EXPORT_DIR, DEFAULT_EXTENSION};
use crate::constants::sampler::DEFAULT_SEED;
use crate::errors::CurationError;
use crate::neighbors::SelfMatch;
use crate::types::MetaField;

/// Which sampling strategy to build and how.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Uniform draw over the eligible pool.
    #[default]
    Uniform,
    /// Uniform over metadata strata, then uniform within the chosen stratum.
    MetadataStratified {
        /// Metadata fields whose value tuple forms the stratum key.
        meta_fields: Vec<MetaField>,
    },
    /// Uniform over fitted k-means clusters, then uniform within the cluster.
    ClusterStratified {
        /// Number of clusters to fit.
        n_clusters: usize,
        /// Lloyd iteration cap.
        max_iter: usize,
        /// Training subsample size (count or fraction of the pool).
        train_size: TrainSize,
    },
}

impl StrategyConfig {
    /// Cluster-stratified config with default k-means parameters.
    pub fn cluster(train_size: TrainSize) -> Self {
        let defaults = KMeansConfig::default();
        StrategyConfig::ClusterStratified {
            n_clusters: defaults.n_clusters,
            max_iter: defaults.max_iter,
            train_size,
        }
    }

    /// Static checks that do not need the pool; pool-dependent checks run at build time.
    pub fn validate(&self) -> Result<(), CurationError> {
        match self {
            StrategyConfig::Uniform => Ok(()),
            StrategyConfig::MetadataStratified { meta_fields } => {
                if meta_fields.is_empty() {
                    return Err(CurationError::Configuration(
                        "metadata_stratified requires at least one meta field".to_string(),
                    ));
                }
                Ok(())
            }
            StrategyConfig::ClusterStratified {
                n_clusters,
                max_iter,
                ..
            } => {
                if *n_clusters == 0 {
                    return Err(CurationError::Configuration(
                        "n_clusters must be > 0".to_string(),
                    ));
                }
                if *max_iter == 0 {
                    return Err(CurationError::Configuration(
                        "max_iter must be > 0".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Top-level sampler configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// RNG seed controlling draws and cluster training subsampling.
    pub seed: u64,
    /// Strategy variant and parameters.
    pub strategy: StrategyConfig,
    /// Rule used to drop the main item from its own neighbor list.
    #[serde(default)]
    pub self_match: SelfMatch,
    /// When set, returned items keep only these metadata fields.
    #[serde(default)]
    pub meta_fields: Option<Vec<MetaField>>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            strategy: StrategyConfig::default(),
            self_match: SelfMatch::default(),
            meta_fields: None,
        }
    }
}

/// Fetch transport and concurrency limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchConfig {
    /// Per-request timeout applied by the HTTP fetcher.
    pub timeout: Duration,
    /// Maximum concurrently in-flight fetches within one batch.
    pub max_in_flight: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl FetchConfig {
    /// Reject a zero concurrency cap or a zero timeout.
    pub fn validate(&self) -> Result<(), CurationError> {
        if self.max_in_flight == 0 {
            return Err(CurationError::Configuration(
                "max_in_flight must be greater than zero".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(CurationError::Configuration(
                "fetch timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Batch export parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportConfig {
    /// Root directory receiving `<attempt>_<main_id>` subdirectories and the manifest.
    pub root: PathBuf,
    /// Upper bound on sampling attempts (not a guarantee of produced units).
    pub attempts: usize,
    /// Neighbors requested per main item.
    pub neighbors: usize,
    /// Extension used for exported member files (without the dot).
    pub extension: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_EXPORT_DIR),
            attempts: 100,
            neighbors: 5,
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl ExportConfig {
    /// Reject empty or path-like extensions.
    pub fn validate(&self) -> Result<(), CurationError> {
        let ext = self.extension.as_str();
        if ext.is_empty() || ext.contains(['.', '/', '\\']) {
            return Err(CurationError::Configuration(format!(
                "invalid export extension '{ext}'"
            )));
        }
        Ok(())
    }
}

/// Embedding ingestion parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestConfig {
    /// Entries fetched and embedded per batch.
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_config_reads_tagged_json() {
        let uniform: StrategyConfig = serde_json::from_str(r#"{"name":"uniform"}"#).unwrap();
        assert_eq!(uniform, StrategyConfig::Uniform);

        let meta: StrategyConfig =
            serde_json::from_str(r#"{"name":"metadata_stratified","meta_fields":["brand"]}"#)
                .unwrap();
        assert_eq!(
            meta,
            StrategyConfig::MetadataStratified {
                meta_fields: vec!["brand".to_string()]
            }
        );

        let cluster: StrategyConfig = serde_json::from_str(
            r#"{"name":"cluster_stratified","n_clusters":4,"max_iter":20,"train_size":0.5}"#,
        )
        .unwrap();
        assert_eq!(
            cluster,
            StrategyConfig::ClusterStratified {
                n_clusters: 4,
                max_iter: 20,
                train_size: TrainSize::Fraction(0.5),
            }
        );
    }

    #[test]
    fn static_validation_rejects_malformed_strategies() {
        assert!(
            StrategyConfig::MetadataStratified {
                meta_fields: Vec::new()
            }
            .validate()
            .is_err()
        );
        assert!(
            StrategyConfig::ClusterStratified {
                n_clusters: 0,
                max_iter: 10,
                train_size: TrainSize::Count(5),
            }
            .validate()
            .is_err()
        );
        assert!(StrategyConfig::cluster(TrainSize::Count(5)).validate().is_ok());
    }

    #[test]
    fn export_and_fetch_configs_validate_inputs() {
        let bad_ext = ExportConfig {
            extension: ".jpg".to_string(),
            ..ExportConfig::default()
        };
        assert!(bad_ext.validate().is_err());
        assert!(ExportConfig::default().validate().is_ok());

        let bad_fetch = FetchConfig {
            max_in_flight: 0,
            ..FetchConfig::default()
        };
        assert!(bad_fetch.validate().is_err());
    }
}
