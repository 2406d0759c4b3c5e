//! Reconciliation of curated export directories into the annotation log.
//!
//! After manual curation a unit directory keeps only the files the curator
//! judged to match the main item. Expected ids with a file on disk become
//! `pos`; expected ids without one become `neg`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::annotations::AnnotationLog;
use crate::data::AnnotationRecord;
use crate::errors::CurationError;
use crate::manifest::SamplesManifest;
use crate::transport::fs::{ExportedDir, MemberEntry, RootEntry, list_member_files, scan_export_root};
use crate::types::ItemId;

/// Summary of one import run.
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Records appended, keyed by main id, in scan order.
    pub imported: Vec<(ItemId, AnnotationRecord)>,
    /// Main ids skipped because they were already annotated.
    pub already_annotated: Vec<ItemId>,
    /// Main ids skipped because the manifest has no entry for them.
    pub missing_from_manifest: Vec<ItemId>,
    /// Root entries that are not unit directories.
    pub ignored_entries: Vec<PathBuf>,
    /// Files whose id is not among the expected members of their directory.
    pub integrity_warnings: usize,
    /// Annotated id count before the run.
    pub annotated_before: usize,
    /// Annotated id count after the run.
    pub annotated_after: usize,
}

/// Imports curated unit directories under one export root.
#[derive(Clone, Debug)]
pub struct ReconciliationImporter {
    root: PathBuf,
}

impl ReconciliationImporter {
    /// Importer over the export `root` holding unit directories and the manifest.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Export root being scanned.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the root, append one record per not-yet-annotated unit, and save `log`.
    ///
    /// Re-running over an unchanged tree appends nothing: every imported main id
    /// lands in `pos` and is skipped on the next pass.
    pub fn run(&self, log: &mut AnnotationLog) -> Result<ImportReport, CurationError> {
        let manifest = SamplesManifest::load(&SamplesManifest::path_in(&self.root))?;
        let mut report = ImportReport {
            annotated_before: log.annotated_ids().len(),
            ..ImportReport::default()
        };
        info!(
            "[curator:import] importing from {}; {} ids annotated so far",
            self.root.display(),
            report.annotated_before
        );

        let mut entries = scan_export_root(&self.root)?;
        // Attempt order, so a unit is never skipped because a later unit kept its main.
        entries.sort_by_key(|entry| match entry {
            RootEntry::Batch(dir) => (0, dir.attempt),
            _ => (1, 0),
        });
        for entry in entries {
            let dir = match entry {
                RootEntry::Batch(dir) => dir,
                RootEntry::NotADirectory(path) | RootEntry::Unrecognized(path) => {
                    warn!(
                        "[curator:import] {} is not a unit directory, skipping",
                        path.display()
                    );
                    report.ignored_entries.push(path);
                    continue;
                }
            };
            if log.is_annotated(&dir.main_id) {
                warn!(
                    "[curator:import] '{}' already annotated, skipping {}",
                    dir.main_id,
                    dir.path.display()
                );
                report.already_annotated.push(dir.main_id);
                continue;
            }
            let Some(expected) = manifest.members(&dir.main_id) else {
                warn!(
                    "[curator:import] '{}' has no manifest entry, skipping {}",
                    dir.main_id,
                    dir.path.display()
                );
                report.missing_from_manifest.push(dir.main_id);
                continue;
            };
            let (record, warnings) = reconcile_dir(&dir, expected)?;
            report.integrity_warnings += warnings;
            log.append(record.clone());
            report.imported.push((dir.main_id, record));
        }

        if !report.imported.is_empty() {
            log.save()?;
        }
        report.annotated_after = log.annotated_ids().len();
        info!(
            "[curator:import] imported {} units; annotated ids {} -> {}",
            report.imported.len(),
            report.annotated_before,
            report.annotated_after
        );
        Ok(report)
    }
}

/// Classify one directory against its expected members.
///
/// The main id is always `pos`. Returns the record and the number of
/// integrity warnings raised for stray files.
fn reconcile_dir(
    dir: &ExportedDir,
    expected: &[ItemId],
) -> Result<(AnnotationRecord, usize), CurationError> {
    let expected_set: HashSet<&ItemId> = expected.iter().collect();
    let mut present: HashSet<ItemId> = HashSet::new();
    let mut warnings = 0;

    for member in list_member_files(&dir.path)? {
        match member {
            MemberEntry::Member { id, path, .. } => {
                if !expected_set.contains(&id) {
                    warn!(
                        "[curator:import] {} names '{}', which is not expected for '{}'",
                        path.display(),
                        id,
                        dir.main_id
                    );
                    warnings += 1;
                }
                present.insert(id);
            }
            MemberEntry::Unrecognized(path) => {
                warn!(
                    "[curator:import] cannot parse member file {}",
                    path.display()
                );
                warnings += 1;
            }
        }
    }

    if !present.contains(&dir.main_id) {
        warn!(
            "[curator:import] main file for '{}' is missing; recording it as pos",
            dir.main_id
        );
    }

    let mut record = AnnotationRecord::default();
    for id in expected {
        if *id == dir.main_id || present.contains(id) {
            record.pos.push(id.clone());
        } else {
            record.neg.push(id.clone());
        }
    }
    if !record.pos.contains(&dir.main_id) {
        record.pos.insert(0, dir.main_id.clone());
    }
    Ok((record, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fs::{batch_dir_name, member_file_name};
    use std::fs;
    use tempfile::tempdir;

    fn ids(raw: &[&str]) -> Vec<ItemId> {
        raw.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn files_present_become_pos_and_deleted_become_neg() {
        let temp = tempdir().unwrap();
        let dir_path = temp.path().join(batch_dir_name(0, "A"));
        fs::create_dir(&dir_path).unwrap();
        for (pos, id) in [(0, "A"), (1, "B"), (3, "D")] {
            fs::write(dir_path.join(member_file_name(pos, id, "jpg")), b"x").unwrap();
        }
        let dir = ExportedDir {
            path: dir_path,
            attempt: 0,
            main_id: "A".to_string(),
        };
        let (record, warnings) = reconcile_dir(&dir, &ids(&["A", "B", "C", "D"])).unwrap();
        assert_eq!(record.pos, ids(&["A", "B", "D"]));
        assert_eq!(record.neg, ids(&["C"]));
        assert_eq!(warnings, 0);
    }

    #[test]
    fn stray_files_warn_without_changing_the_record() {
        let temp = tempdir().unwrap();
        let dir_path = temp.path().join(batch_dir_name(2, "A"));
        fs::create_dir(&dir_path).unwrap();
        fs::write(dir_path.join(member_file_name(0, "A", "jpg")), b"x").unwrap();
        fs::write(dir_path.join(member_file_name(5, "Z", "jpg")), b"x").unwrap();
        fs::write(dir_path.join("thumbs.db"), b"x").unwrap();
        let dir = ExportedDir {
            path: dir_path,
            attempt: 2,
            main_id: "A".to_string(),
        };
        let (record, warnings) = reconcile_dir(&dir, &ids(&["A", "B"])).unwrap();
        assert_eq!(record.pos, ids(&["A"]));
        assert_eq!(record.neg, ids(&["B"]));
        assert_eq!(warnings, 2);
    }

    #[test]
    fn deleted_main_file_is_still_recorded_as_pos() {
        let temp = tempdir().unwrap();
        let dir_path = temp.path().join(batch_dir_name(0, "A"));
        fs::create_dir(&dir_path).unwrap();
        fs::write(dir_path.join(member_file_name(1, "B", "jpg")), b"x").unwrap();
        let dir = ExportedDir {
            path: dir_path,
            attempt: 0,
            main_id: "A".to_string(),
        };
        let (record, _) = reconcile_dir(&dir, &ids(&["A", "B", "C"])).unwrap();
        assert_eq!(record.pos, ids(&["A", "B"]));
        assert_eq!(record.neg, ids(&["C"]));
    }

    #[test]
    fn rerun_over_unchanged_tree_appends_nothing() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("out");
        fs::create_dir_all(root.join(batch_dir_name(0, "A"))).unwrap();
        fs::write(
            root.join(batch_dir_name(0, "A")).join(member_file_name(0, "A", "jpg")),
            b"x",
        )
        .unwrap();
        let mut manifest = SamplesManifest::new();
        manifest.insert("A".into(), ids(&["A", "B"]));
        manifest.save(&SamplesManifest::path_in(&root)).unwrap();

        let log_path = temp.path().join("annotations.json");
        let importer = ReconciliationImporter::new(&root);

        let mut log = AnnotationLog::open(&log_path).unwrap();
        let first = importer.run(&mut log).unwrap();
        assert_eq!(first.imported.len(), 1);
        assert_eq!(first.ignored_entries.len(), 1);

        let mut log = AnnotationLog::open(&log_path).unwrap();
        let second = importer.run(&mut log).unwrap();
        assert!(second.imported.is_empty());
        assert_eq!(second.already_annotated, ids(&["A"]));
        assert_eq!(AnnotationLog::open(&log_path).unwrap().len(), 1);
    }
}
