//! Concurrent content fetching with per-item fault isolation.
//!
//! Every locator handed to [`FetchPipeline::fetch_all`] lands in exactly one of
//! the two outcome maps. Embedding runs only after all fetches settle, as one
//! bulk call over the successes.

use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::FetchConfig;
use crate::errors::CurationError;
use crate::types::{Embedding, Locator};

/// Classified per-item fetch failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, timeout, or body read failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The remote answered with a non-success status code.
    #[error("remote returned status {0}")]
    RemoteStatus(u16),
}

/// Decoded content fetched for one locator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedContent {
    /// Raw payload bytes.
    pub bytes: Vec<u8>,
    /// Reported content type, when the transport provides one.
    pub content_type: Option<String>,
}

impl FetchedContent {
    /// Wrap raw bytes without a content type.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: None,
        }
    }
}

/// Fetch capability: resolve one locator into content or a classified error.
pub trait Fetcher: Send + Sync {
    /// Fetch `locator`. Must not panic on remote failure.
    fn fetch(&self, locator: &str) -> Result<FetchedContent, FetchError>;
}

/// Embedding capability: one vector per input, in input order.
pub trait Embedder: Send + Sync {
    /// Embed a batch of fetched content.
    fn embed(&self, batch: &[FetchedContent]) -> Result<Vec<Embedding>, CurationError>;
}

/// HTTP(S) fetcher backed by a shared `ureq` agent.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// Build a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, locator: &str) -> Result<FetchedContent, FetchError> {
        let mut response = self
            .agent
            .get(locator)
            .call()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::RemoteStatus(status.as_u16()));
        }
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .body_mut()
            .read_to_vec()
            .map_err(|err| FetchError::Transport(format!("failed reading body: {err}")))?;
        Ok(FetchedContent {
            bytes,
            content_type,
        })
    }
}

/// Partitioned outcome of one concurrent fetch batch.
#[derive(Debug, Default)]
pub struct FetchBatch {
    /// Locators fetched successfully, in input order.
    pub succeeded: IndexMap<Locator, FetchedContent>,
    /// Locators that failed, in input order.
    pub failed: IndexMap<Locator, FetchError>,
}

impl FetchBatch {
    /// Total number of distinct locators covered by the batch.
    pub fn len(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Returns `true` when the batch covered no locators.
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }
}

/// Outcome of fetch-all followed by one bulk embedding call.
#[derive(Debug, Default)]
pub struct EmbeddedBatch {
    /// Embeddings for successfully fetched locators, in input order.
    pub embeddings: IndexMap<Locator, Embedding>,
    /// Locators that failed to fetch.
    pub failed: IndexMap<Locator, FetchError>,
}

/// Fetches locators concurrently on a bounded pool, isolating per-item failures.
pub struct FetchPipeline {
    fetcher: Arc<dyn Fetcher>,
    pool: ThreadPool,
    max_in_flight: usize,
}

impl FetchPipeline {
    /// Create a pipeline running at most `config.max_in_flight` fetches at once.
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &FetchConfig) -> Result<Self, CurationError> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.max_in_flight)
            .thread_name(|idx| format!("curator-fetch-{idx}"))
            .build()
            .map_err(|err| {
                CurationError::Configuration(format!("failed to build fetch pool: {err}"))
            })?;
        Ok(Self {
            fetcher,
            pool,
            max_in_flight: config.max_in_flight,
        })
    }

    /// Pipeline over an [`HttpFetcher`] configured from `config`.
    pub fn http(config: &FetchConfig) -> Result<Self, CurationError> {
        Self::new(Arc::new(HttpFetcher::new(config.timeout)), config)
    }

    /// Configured concurrency cap.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Fetch a single locator on the calling thread.
    pub fn fetch_one(&self, locator: &str) -> Result<FetchedContent, FetchError> {
        let outcome = self.fetcher.fetch(locator);
        if let Err(err) = &outcome {
            info!("[curator:fetch] failed loading {}: {}", locator, err);
        }
        outcome
    }

    /// Fetch every locator concurrently and wait for all of them to settle.
    ///
    /// Duplicate locators are fetched once. The key sets of `succeeded` and
    /// `failed` are disjoint and together equal the distinct input locators.
    pub fn fetch_all(&self, locators: &[Locator]) -> FetchBatch {
        let unique: IndexSet<&Locator> = locators.iter().collect();
        if unique.is_empty() {
            return FetchBatch::default();
        }
        let unique: Vec<&Locator> = unique.into_iter().collect();
        let fetcher = self.fetcher.as_ref();
        let outcomes: Vec<(Locator, Result<FetchedContent, FetchError>)> =
            self.pool.install(|| {
                unique
                    .par_iter()
                    .map(|locator| ((*locator).clone(), fetcher.fetch(locator)))
                    .collect()
            });

        let mut batch = FetchBatch::default();
        for (locator, outcome) in outcomes {
            match outcome {
                Ok(content) => {
                    batch.succeeded.insert(locator, content);
                }
                Err(err) => {
                    info!("[curator:fetch] failed loading {}: {}", locator, err);
                    batch.failed.insert(locator, err);
                }
            }
        }
        debug!(
            "[curator:fetch] batch settled: {} succeeded, {} failed",
            batch.succeeded.len(),
            batch.failed.len()
        );
        batch
    }

    /// Fetch all locators, then embed every success with one `embedder` call.
    pub fn fetch_and_embed(
        &self,
        locators: &[Locator],
        embedder: &dyn Embedder,
    ) -> Result<EmbeddedBatch, CurationError> {
        let FetchBatch { succeeded, failed } = self.fetch_all(locators);
        if succeeded.is_empty() {
            return Ok(EmbeddedBatch {
                embeddings: IndexMap::new(),
                failed,
            });
        }
        let (loaded, contents): (Vec<Locator>, Vec<FetchedContent>) = succeeded.into_iter().unzip();
        let vectors = embedder.embed(&contents)?;
        if vectors.len() != loaded.len() {
            return Err(CurationError::Embedding(format!(
                "embedder returned {} vectors for {} inputs",
                vectors.len(),
                loaded.len()
            )));
        }
        Ok(EmbeddedBatch {
            embeddings: loaded.into_iter().zip(vectors).collect(),
            failed,
        })
    }
}
