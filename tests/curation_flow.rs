use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use neighbor_curator::config::{ExportConfig, FetchConfig, SamplerConfig, StrategyConfig};
use neighbor_curator::data::{AnnotationRecord, Item, Metadata};
use neighbor_curator::fetch::{FetchError, FetchPipeline, FetchedContent, Fetcher};
use neighbor_curator::index::{DistanceMetric, InMemoryVectorIndex};
use neighbor_curator::transport::fs::{batch_dir_name, member_file_name};
use neighbor_curator::{
    AnnotationLog, BatchExporter, CurationSession, ReconciliationImporter, SamplesManifest,
};

/// Serves every locator except those whose path contains `missing`.
struct StaticFetcher;

impl Fetcher for StaticFetcher {
    fn fetch(&self, locator: &str) -> Result<FetchedContent, FetchError> {
        if locator.contains("missing") {
            return Err(FetchError::RemoteStatus(404));
        }
        Ok(FetchedContent {
            bytes: locator.as_bytes().to_vec(),
            content_type: Some("image/jpeg".to_string()),
        })
    }
}

fn catalog() -> Arc<InMemoryVectorIndex> {
    let mut items = Vec::new();
    for i in 0..24 {
        let id = if i % 7 == 3 {
            format!("missing-{i:02}")
        } else {
            format!("item-{i:02}")
        };
        items.push(Item {
            locator: format!("http://cdn.test/{id}.jpg"),
            id,
            embedding: vec![(i / 4) as f32, (i % 4) as f32 * 0.1],
            metadata: Metadata::from_iter([("group".to_string(), json!(i % 3))]),
        });
    }
    Arc::new(InMemoryVectorIndex::with_items(DistanceMetric::L2, items))
}

fn exporter(root: &Path, attempts: usize) -> BatchExporter {
    let pipeline = FetchPipeline::new(
        Arc::new(StaticFetcher),
        &FetchConfig {
            max_in_flight: 4,
            ..FetchConfig::default()
        },
    )
    .unwrap();
    BatchExporter::new(
        pipeline,
        ExportConfig {
            root: root.to_path_buf(),
            attempts,
            neighbors: 3,
            ..ExportConfig::default()
        },
    )
    .unwrap()
}

fn metadata_config() -> SamplerConfig {
    SamplerConfig {
        seed: 9,
        strategy: StrategyConfig::MetadataStratified {
            meta_fields: vec!["group".to_string()],
        },
        ..SamplerConfig::default()
    }
}

#[test]
fn export_curate_import_round() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("annotation_dirs");
    let log_path = temp.path().join("annotated").join("annotations.json");

    let mut session = CurationSession::open(catalog(), &log_path, metadata_config()).unwrap();
    let report = session.export(&exporter(&root, 4)).unwrap();
    assert!(report.attempts <= 4);
    assert_eq!(report.produced() + report.discarded.len(), report.attempts);

    // Discarded mains leave nothing behind.
    let manifest = SamplesManifest::load(&root.join("samples.json")).unwrap();
    for main in &report.discarded {
        assert!(manifest.members(main).is_none());
    }
    assert_eq!(manifest.len(), report.produced());

    // The curator deletes the last member file of every unit that has neighbors.
    let mut deleted: HashMap<String, String> = HashMap::new();
    for batch in &report.batches {
        let dir = root.join(batch_dir_name(batch.index, &batch.main_id));
        assert!(dir.is_dir());
        if batch.members.len() > 1 {
            let victim = batch.members.last().unwrap();
            let victim_file = fs::read_dir(&dir)
                .unwrap()
                .map(|entry| entry.unwrap().path())
                .find(|path| {
                    path.file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| name.ends_with(&format!("_{victim}.jpg")))
                })
                .unwrap();
            fs::remove_file(victim_file).unwrap();
            deleted.insert(batch.main_id.clone(), victim.clone());
        }
    }

    let importer = ReconciliationImporter::new(&root);
    let imported = session.import(&importer).unwrap();
    assert_eq!(imported.imported.len(), report.produced());
    for (main_id, record) in &imported.imported {
        assert_eq!(record.pos.first(), Some(main_id));
        match deleted.get(main_id) {
            Some(victim) => assert_eq!(&record.neg, &vec![victim.clone()]),
            None => assert!(record.neg.is_empty()),
        }
        let expected = manifest.members(main_id).unwrap();
        assert_eq!(record.pos.len() + record.neg.len(), expected.len());
    }

    // Second import over the unchanged tree appends nothing.
    let again = session.import(&importer).unwrap();
    assert!(again.imported.is_empty());
    assert_eq!(again.already_annotated.len(), report.produced());
    assert_eq!(session.log().len(), report.produced());

    // A fresh session never offers an annotated id as a main item.
    let annotated: HashSet<String> = session.log().annotated_ids().clone();
    let mut fresh = CurationSession::open(catalog(), &log_path, metadata_config()).unwrap();
    while let Some(sample) = fresh.sample(0).unwrap() {
        assert!(!annotated.contains(&sample.main.id));
    }
}

#[test]
fn reconciliation_matches_files_left_on_disk() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("dirs");
    let unit = root.join(batch_dir_name(7, "A"));
    fs::create_dir_all(&unit).unwrap();
    for (position, id) in [(0, "A"), (1, "B"), (3, "D")] {
        fs::write(unit.join(member_file_name(position, id, "jpg")), b"img").unwrap();
    }
    let mut manifest = SamplesManifest::new();
    manifest.insert(
        "A".to_string(),
        vec!["A".into(), "B".into(), "C".into(), "D".into()],
    );
    manifest.save(&SamplesManifest::path_in(&root)).unwrap();

    let log_path = temp.path().join("annotations.json");
    let mut log = AnnotationLog::open(&log_path).unwrap();
    let report = ReconciliationImporter::new(&root).run(&mut log).unwrap();

    assert_eq!(report.imported.len(), 1);
    assert_eq!(report.annotated_before, 0);
    assert_eq!(report.annotated_after, 3);
    let stored = AnnotationLog::open(&log_path).unwrap();
    assert_eq!(
        stored.records(),
        &[AnnotationRecord {
            pos: vec!["A".into(), "B".into(), "D".into()],
            neg: vec!["C".into()],
        }]
    );
    let raw = fs::read_to_string(&log_path).unwrap();
    assert!(raw.starts_with("[\n    {"));
}

#[test]
fn exported_main_failure_is_discarded_even_with_neighbors() {
    let items = vec![
        Item {
            id: "missing-main".into(),
            locator: "http://cdn.test/missing-main.jpg".into(),
            embedding: vec![0.0, 0.0],
            metadata: Metadata::new(),
        },
        Item {
            id: "neighbor".into(),
            locator: "http://cdn.test/neighbor.jpg".into(),
            embedding: vec![0.1, 0.0],
            metadata: Metadata::new(),
        },
    ];
    let index = Arc::new(InMemoryVectorIndex::with_items(DistanceMetric::L2, items));
    let temp = tempdir().unwrap();
    let root = temp.path().join("out");
    let log_path = temp.path().join("annotations.json");
    let mut session = CurationSession::open(index, &log_path, SamplerConfig::default()).unwrap();

    let report = session.export(&exporter(&root, 2)).unwrap();
    let manifest = SamplesManifest::load(&report.manifest_path).unwrap();
    for main in &report.discarded {
        assert_eq!(main, "missing-main");
        assert!(manifest.members(main).is_none());
        let leftover = fs::read_dir(&root)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .any(|name| name.ends_with("_missing-main"));
        assert!(!leftover);
    }
    // Whichever item was drawn first, exactly one attempt touched "missing-main".
    let touched = report.discarded.len()
        + report
            .batches
            .iter()
            .filter(|batch| batch.members.iter().any(|id| id == "missing-main"))
            .count();
    assert!(touched <= 1);
}
