//! Embedding ingestion: fetch, embed, and upsert new content into the index.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::data::{Item, Metadata};
use crate::errors::CurationError;
use crate::fetch::{Embedder, FetchError, FetchPipeline};
use crate::index::VectorIndex;
use crate::types::{ItemId, Locator};

/// One candidate row to ingest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngestEntry {
    /// Content locator to fetch and embed.
    pub locator: Locator,
    /// Metadata stored alongside the embedding.
    #[serde(default)]
    pub metadata: Metadata,
}

/// Summary of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Ids assigned to newly stored items.
    pub added: Vec<ItemId>,
    /// Entries skipped because their locator is already indexed.
    pub already_indexed: usize,
    /// Entries dropped because their locator occurred more than once in the input.
    pub duplicates_dropped: usize,
    /// Locators that failed to fetch.
    pub failed: IndexMap<Locator, FetchError>,
}

/// Fetch, embed, and store every new entry.
///
/// Locators repeated within `entries` are dropped entirely (every copy), and
/// locators already present in `index` are skipped. Each batch runs one
/// fetch-all, one bulk embed call, and one upsert.
pub fn ingest(
    index: &dyn VectorIndex,
    pipeline: &FetchPipeline,
    embedder: &dyn Embedder,
    entries: Vec<IngestEntry>,
    config: &IngestConfig,
) -> Result<IngestReport, CurationError> {
    if config.batch_size == 0 {
        return Err(CurationError::Configuration(
            "ingest batch_size must be greater than zero".to_string(),
        ));
    }
    let mut report = IngestReport::default();

    let mut occurrences: IndexMap<Locator, usize> = IndexMap::new();
    for entry in &entries {
        *occurrences.entry(entry.locator.clone()).or_default() += 1;
    }
    let existing = index.locators()?;
    let mut pending = Vec::with_capacity(entries.len());
    for entry in entries {
        if occurrences[&entry.locator] > 1 {
            report.duplicates_dropped += 1;
            continue;
        }
        if existing.contains(&entry.locator) {
            report.already_indexed += 1;
            continue;
        }
        pending.push(entry);
    }
    if report.duplicates_dropped > 0 {
        warn!(
            "[curator:ingest] dropped {} entries with repeated locators",
            report.duplicates_dropped
        );
    }
    info!(
        "[curator:ingest] {} new entries ({} already indexed)",
        pending.len(),
        report.already_indexed
    );

    for chunk in pending.chunks(config.batch_size) {
        let locators: Vec<Locator> = chunk.iter().map(|entry| entry.locator.clone()).collect();
        let mut embedded = pipeline.fetch_and_embed(&locators, embedder)?;
        let items: Vec<Item> = chunk
            .iter()
            .filter_map(|entry| {
                let embedding = embedded.embeddings.swap_remove(&entry.locator)?;
                Some(Item {
                    id: Uuid::new_v4().to_string(),
                    locator: entry.locator.clone(),
                    embedding,
                    metadata: entry.metadata.clone(),
                })
            })
            .collect();
        report.failed.extend(embedded.failed);
        if items.is_empty() {
            continue;
        }
        report.added.extend(items.iter().map(|item| item.id.clone()));
        index.upsert(items)?;
    }

    info!(
        "[curator:ingest] added {} items, {} failed to load",
        report.added.len(),
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::fetch::{FetchedContent, Fetcher};
    use crate::index::{DistanceMetric, InMemoryVectorIndex};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoFetcher;

    impl Fetcher for EchoFetcher {
        fn fetch(&self, locator: &str) -> Result<FetchedContent, FetchError> {
            if locator.ends_with(".gone") {
                return Err(FetchError::RemoteStatus(410));
            }
            Ok(FetchedContent::from_bytes(locator.as_bytes()))
        }
    }

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn embed(&self, batch: &[FetchedContent]) -> Result<Vec<Vec<f32>>, CurationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(batch
                .iter()
                .map(|content| vec![content.bytes.len() as f32, 1.0])
                .collect())
        }
    }

    fn entry(locator: &str) -> IngestEntry {
        IngestEntry {
            locator: locator.to_string(),
            metadata: Metadata::from_iter([("url".to_string(), json!(locator))]),
        }
    }

    #[test]
    fn ingest_drops_repeats_skips_known_and_batches_embeds() {
        let index = InMemoryVectorIndex::new(DistanceMetric::Cosine);
        index
            .upsert(vec![Item {
                id: "known".into(),
                locator: "http://h/known".into(),
                embedding: vec![1.0, 1.0],
                metadata: Metadata::new(),
            }])
            .unwrap();
        let pipeline = FetchPipeline::new(Arc::new(EchoFetcher), &FetchConfig::default()).unwrap();
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
        };
        let entries = vec![
            entry("http://h/known"),
            entry("http://h/dup"),
            entry("http://h/a"),
            entry("http://h/dup"),
            entry("http://h/b"),
            entry("http://h/c.gone"),
        ];
        let report = ingest(
            &index,
            &pipeline,
            &embedder,
            entries,
            &IngestConfig { batch_size: 2 },
        )
        .unwrap();

        assert_eq!(report.duplicates_dropped, 2);
        assert_eq!(report.already_indexed, 1);
        assert_eq!(report.added.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed.contains_key("http://h/c.gone"));
        // Two batches: [a, b] and [c.gone]; the second has nothing to embed.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(index.count().unwrap(), 3);
        let stored = index.get_by_ids(&report.added).unwrap();
        assert!(stored.iter().all(|item| Uuid::parse_str(&item.id).is_ok()));
        assert!(!index.locators().unwrap().contains("http://h/dup"));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let index = InMemoryVectorIndex::new(DistanceMetric::Cosine);
        let pipeline = FetchPipeline::new(Arc::new(EchoFetcher), &FetchConfig::default()).unwrap();
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
        };
        let err = ingest(
            &index,
            &pipeline,
            &embedder,
            vec![entry("http://h/a")],
            &IngestConfig { batch_size: 0 },
        )
        .unwrap_err();
        assert!(matches!(err, CurationError::Configuration(_)));
    }
}
