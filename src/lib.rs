#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Persisted annotation log.
pub mod annotations;
/// Command-line runners shared by the demo binaries.
pub mod apps;
/// K-means fitting used by the cluster-stratified strategy.
pub mod cluster;
/// Strategy, sampler, fetch, export, and ingest configuration types.
pub mod config;
/// Centralized constants used across sampling, fetching, and layout.
pub mod constants;
/// Item, sample, and annotation record types.
pub mod data;
/// Permanent main-item exclusion set.
pub mod exclusion;
/// Batch export workflow.
pub mod export;
/// Concurrent fetch pipeline and fetch/embed capabilities.
pub mod fetch;
/// Embedding ingestion into the vector index.
pub mod ingest;
/// Vector index capability and in-memory implementation.
pub mod index;
/// Samples manifest written by export and read by import.
pub mod manifest;
/// Stratum coverage metrics.
pub mod metrics;
/// Neighbor resolution with self-match filtering.
pub mod neighbors;
/// Reconciliation of curated directories into the annotation log.
pub mod reconcile;
/// Sampling strategies and the public sampling API.
pub mod sampler;
/// Application state threading the log and sampler through operations.
pub mod session;
/// Filesystem transport for exported units and persisted artifacts.
pub mod transport;
/// Shared type aliases.
pub mod types;

mod errors;

pub use annotations::AnnotationLog;
pub use cluster::{KMeans, KMeansConfig, TrainSize};
pub use config::{ExportConfig, FetchConfig, IngestConfig, SamplerConfig, StrategyConfig};
pub use data::{AnnotationRecord, DirectoryBatch, Item, Metadata, SampleResult};
pub use errors::CurationError;
pub use exclusion::ExclusionSet;
pub use export::{BatchExporter, ExportReport};
pub use fetch::{
    Embedder, EmbeddedBatch, FetchBatch, FetchError, FetchPipeline, FetchedContent, Fetcher,
    HttpFetcher,
};
pub use index::{DistanceMetric, InMemoryVectorIndex, VectorIndex};
pub use ingest::{IngestEntry, IngestReport, ingest};
pub use manifest::SamplesManifest;
pub use metrics::{CoverageSkew, StratumShare};
pub use neighbors::{NeighborResolver, SelfMatch};
pub use reconcile::{ImportReport, ReconciliationImporter};
pub use sampler::{NeighborSampler, SamplingStrategy};
pub use session::CurationSession;
pub use types::{Embedding, ItemId, Locator, MetaField, StratumLabel};
