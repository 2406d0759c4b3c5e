use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;

use neighbor_curator::config::{FetchConfig, IngestConfig, SamplerConfig};
use neighbor_curator::fetch::{Embedder, FetchError, FetchPipeline, FetchedContent, Fetcher};
use neighbor_curator::index::{DistanceMetric, InMemoryVectorIndex, VectorIndex};
use neighbor_curator::ingest::{IngestEntry, ingest};
use neighbor_curator::sampler::NeighborSampler;
use neighbor_curator::{CurationError, Embedding, Locator};

struct FlakyFetcher;

impl Fetcher for FlakyFetcher {
    fn fetch(&self, locator: &str) -> Result<FetchedContent, FetchError> {
        match locator.rsplit('/').next() {
            Some(name) if name.starts_with("timeout") => {
                Err(FetchError::Transport("timed out".to_string()))
            }
            Some(name) if name.starts_with("gone") => Err(FetchError::RemoteStatus(404)),
            _ => Ok(FetchedContent::from_bytes(locator.as_bytes())),
        }
    }
}

struct ByteSumEmbedder {
    calls: AtomicUsize,
}

impl Embedder for ByteSumEmbedder {
    fn embed(&self, batch: &[FetchedContent]) -> Result<Vec<Embedding>, CurationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(batch
            .iter()
            .map(|content| {
                let sum: u32 = content.bytes.iter().map(|b| *b as u32).sum();
                vec![sum as f32, content.bytes.len() as f32]
            })
            .collect())
    }
}

#[test]
fn fetch_partition_holds_for_mixed_failures() {
    let pipeline = FetchPipeline::new(
        Arc::new(FlakyFetcher),
        &FetchConfig {
            max_in_flight: 3,
            ..FetchConfig::default()
        },
    )
    .unwrap();
    for (n, m) in [(1usize, 0usize), (5, 5), (9, 4), (20, 7)] {
        let locators: Vec<Locator> = (0..n)
            .map(|i| {
                if i < m {
                    let kind = if i % 2 == 0 { "timeout" } else { "gone" };
                    format!("http://cdn.test/{kind}-{i}.jpg")
                } else {
                    format!("http://cdn.test/ok-{i}.jpg")
                }
            })
            .collect();
        let batch = pipeline.fetch_all(&locators);
        assert_eq!(batch.succeeded.len() + batch.failed.len(), n);
        assert_eq!(batch.failed.len(), m);
        let ok: HashSet<&Locator> = batch.succeeded.keys().collect();
        let failed: HashSet<&Locator> = batch.failed.keys().collect();
        assert!(ok.is_disjoint(&failed));
        let union: HashSet<&Locator> = ok.union(&failed).copied().collect();
        assert_eq!(union, locators.iter().collect());
    }
}

#[test]
fn ingested_items_are_immediately_sampleable() {
    let index = Arc::new(InMemoryVectorIndex::new(DistanceMetric::L2));
    let pipeline = FetchPipeline::new(Arc::new(FlakyFetcher), &FetchConfig::default()).unwrap();
    let embedder = ByteSumEmbedder {
        calls: AtomicUsize::new(0),
    };
    let entries: Vec<IngestEntry> = (0..10)
        .map(|i| IngestEntry {
            locator: if i == 4 {
                "http://cdn.test/gone-4.jpg".to_string()
            } else {
                format!("http://cdn.test/ok-{i}.jpg")
            },
            metadata: [("shard".to_string(), json!(i % 2))].into_iter().collect(),
        })
        .collect();

    let report = ingest(
        index.as_ref(),
        &pipeline,
        &embedder,
        entries.clone(),
        &IngestConfig { batch_size: 4 },
    )
    .unwrap();
    assert_eq!(report.added.len(), 9);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);

    // Running again adds nothing new except a retry of the failed locator.
    let rerun = ingest(
        index.as_ref(),
        &pipeline,
        &embedder,
        entries,
        &IngestConfig { batch_size: 4 },
    )
    .unwrap();
    assert!(rerun.added.is_empty());
    assert_eq!(rerun.already_indexed, 9);
    assert_eq!(index.count().unwrap(), 9);

    let mut sampler = NeighborSampler::new(index, SamplerConfig::default()).unwrap();
    let sample = sampler.sample(3).unwrap().unwrap();
    assert_eq!(sample.neighbors.len(), 3);
    assert!(sample.main.metadata.contains_key("shard"));
}
