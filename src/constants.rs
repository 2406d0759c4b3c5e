/// Constants used by sampling strategies and neighbor resolution.
pub mod sampler {
    /// Default RNG seed for strategies that do not carry their own.
    pub const DEFAULT_SEED: u64 = 42;
    /// Extra results requested from the index to absorb the main item's self-match.
    pub const SELF_MATCH_OVERFETCH: usize = 1;
    /// Separator between `field=value` parts in a rendered stratum label.
    pub const STRATUM_LABEL_DELIMITER: &str = "|";
    /// Prefix used when rendering cluster stratum labels.
    pub const CLUSTER_LABEL_PREFIX: &str = "cluster=";
}

/// Constants used by k-means fitting.
pub mod cluster {
    /// Default number of clusters fitted by the cluster-stratified strategy.
    pub const DEFAULT_CLUSTERS: usize = 8;
    /// Default Lloyd iteration cap.
    pub const DEFAULT_MAX_ITER: usize = 300;
    /// Centroid movement below which fitting stops early.
    pub const CONVERGENCE_THRESHOLD: f32 = 1e-4;
}

/// Constants used by the concurrent fetch pipeline.
pub mod fetch {
    /// Default per-request timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    /// Default cap on concurrently in-flight fetches within one batch.
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;
}

/// Constants used by export layout and persisted artifacts.
pub mod layout {
    /// Manifest filename written inside the export root.
    pub const MANIFEST_FILENAME: &str = "samples.json";
    /// Separator between the numeric prefix and the id in directory and file names.
    pub const NAME_DELIMITER: char = '_';
    /// Default extension for exported member files.
    pub const DEFAULT_EXTENSION: &str = "jpg";
    /// Default export root directory.
    pub const DEFAULT_EXPORT_DIR: &str = "data/annotation_dirs";
    /// Default annotation log path.
    pub const DEFAULT_ANNOTATIONS_PATH: &str = "data/annotated/annotations.json";
    /// Suffix used for temp files during atomic rewrites.
    pub const TEMP_SUFFIX: &str = "part";
}

/// Constants used by embedding ingestion.
pub mod ingest {
    /// Default number of entries fetched and embedded per batch.
    pub const DEFAULT_BATCH_SIZE: usize = 256;
}
