//! Batch export of sampled units into per-attempt directories.
//!
//! Each attempt draws one [`SampleResult`](crate::data::SampleResult), fetches
//! the main item first, and only then fetches the neighbors concurrently. A
//! failed main item discards the attempt's directory. Every loaded id is
//! excluded from future draws. The manifest is rewritten after every kept
//! unit, so the export root stays importable even when a run aborts.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::ExportConfig;
use crate::data::{DirectoryBatch, SampleResult};
use crate::errors::CurationError;
use crate::fetch::FetchPipeline;
use crate::manifest::SamplesManifest;
use crate::metrics::CoverageSkew;
use crate::sampler::NeighborSampler;
use crate::transport::fs::{batch_dir_name, is_path_safe_id, member_file_name, prepare_export_root};
use crate::types::{ItemId, Locator};

/// Summary of one export run.
#[derive(Debug, Default)]
pub struct ExportReport {
    /// Attempts consumed, including discarded and skipped ones.
    pub attempts: usize,
    /// Units written to disk, in attempt order.
    pub batches: Vec<DirectoryBatch>,
    /// Main ids whose fetch failed; their directories were removed.
    pub discarded: Vec<ItemId>,
    /// Attempts skipped because the index could not resolve the drawn item.
    pub sample_failures: usize,
    /// Ids that cannot be used as path components; never written.
    pub unsafe_ids: Vec<ItemId>,
    /// Neighbor fetch failures across all kept units.
    pub neighbor_failures: usize,
    /// Whether the run stopped because no eligible items remained.
    pub exhausted: bool,
    /// Where the manifest was written.
    pub manifest_path: PathBuf,
    /// Stratum coverage after the run, when the strategy is stratified.
    pub coverage: Option<CoverageSkew>,
}

impl ExportReport {
    /// Number of units actually produced.
    pub fn produced(&self) -> usize {
        self.batches.len()
    }
}

/// Drives sampling, fetching, and on-disk grouping for one export root.
pub struct BatchExporter {
    pipeline: FetchPipeline,
    config: ExportConfig,
}

impl BatchExporter {
    /// Validate `config` and pair it with a fetch pipeline.
    pub fn new(pipeline: FetchPipeline, config: ExportConfig) -> Result<Self, CurationError> {
        config.validate()?;
        Ok(Self { pipeline, config })
    }

    /// Export configuration in use.
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Run up to `config.attempts` attempts against `sampler`.
    ///
    /// The export root must be missing or empty. Returns early when the
    /// sampler runs out of eligible items. Index failures for one drawn item
    /// skip that attempt. Any other error removes the in-progress directory
    /// and returns, leaving every kept unit listed in the manifest.
    pub fn run(&self, sampler: &mut NeighborSampler) -> Result<ExportReport, CurationError> {
        let root = &self.config.root;
        prepare_export_root(root)?;
        info!(
            "[curator:export] exporting up to {} units with {} neighbors into {} ({} eligible, {} in flight)",
            self.config.attempts,
            self.config.neighbors,
            root.display(),
            sampler.eligible_len(),
            self.pipeline.max_in_flight()
        );

        let mut manifest = SamplesManifest::new();
        let mut report = ExportReport {
            manifest_path: SamplesManifest::path_in(root),
            ..ExportReport::default()
        };
        manifest.save(&report.manifest_path)?;

        for attempt in 0..self.config.attempts {
            let sample = match sampler.sample(self.config.neighbors) {
                Ok(Some(sample)) => sample,
                Ok(None) => {
                    info!("[curator:export] no items remaining after {attempt} attempts");
                    report.exhausted = true;
                    break;
                }
                Err(err @ CurationError::Index { .. }) => {
                    warn!("[curator:export] attempt {attempt} skipped: {err}");
                    report.attempts += 1;
                    report.sample_failures += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };
            report.attempts += 1;

            let main_id = sample.main.id.clone();
            if !is_path_safe_id(&main_id) {
                warn!(
                    "[curator:export] main id {:?} cannot be used in a directory name; skipping",
                    main_id
                );
                report.unsafe_ids.push(main_id);
                continue;
            }
            let dir = root.join(batch_dir_name(attempt, &main_id));
            fs::create_dir(&dir)?;

            let members = match self.write_unit(&dir, &sample, &mut report) {
                Ok(Some(members)) => members,
                Ok(None) => {
                    report.discarded.push(main_id);
                    continue;
                }
                Err(err) => {
                    discard_dir(&dir);
                    return Err(err);
                }
            };

            manifest.insert(main_id.clone(), members.clone());
            if let Err(err) = manifest.save(&report.manifest_path) {
                discard_dir(&dir);
                return Err(err);
            }
            sampler.exclude(members.iter());
            report.batches.push(DirectoryBatch {
                index: attempt,
                main_id,
                members,
            });
        }

        report.coverage = sampler.coverage();
        info!(
            "[curator:export] produced {} units from {} attempts ({} discarded); manifest at {}",
            report.produced(),
            report.attempts,
            report.discarded.len(),
            report.manifest_path.display()
        );
        if let Some(coverage) = &report.coverage {
            info!(
                "[curator:export] stratum coverage: {} strata, {} draws, max/min ratio {:.2}",
                coverage.strata, coverage.total, coverage.ratio
            );
        }
        Ok(report)
    }

    /// Fill `dir` with the main item and every neighbor that loads.
    ///
    /// Returns the member ids, main first, or `None` when the main item failed
    /// and `dir` was removed.
    fn write_unit(
        &self,
        dir: &Path,
        sample: &SampleResult,
        report: &mut ExportReport,
    ) -> Result<Option<Vec<ItemId>>, CurationError> {
        let main_id = &sample.main.id;
        let main_content = match self.pipeline.fetch_one(&sample.main.locator) {
            Ok(content) => content,
            Err(err) => {
                info!(
                    "[curator:export] main item '{}' failed ({}); discarding {}",
                    main_id,
                    err,
                    dir.display()
                );
                fs::remove_dir_all(dir)?;
                return Ok(None);
            }
        };
        fs::write(
            dir.join(member_file_name(0, main_id, &self.config.extension)),
            &main_content.bytes,
        )?;

        let mut locators: Vec<Locator> = Vec::with_capacity(sample.neighbors.len());
        for neighbor in &sample.neighbors {
            if is_path_safe_id(&neighbor.id) {
                locators.push(neighbor.locator.clone());
            } else {
                warn!(
                    "[curator:export] neighbor id {:?} of '{}' cannot be used in a file name; skipping",
                    neighbor.id, main_id
                );
                report.unsafe_ids.push(neighbor.id.clone());
            }
        }
        let fetched = self.pipeline.fetch_all(&locators);
        report.neighbor_failures += fetched.failed.len();

        let mut members = vec![main_id.clone()];
        for (offset, neighbor) in sample.neighbors.iter().enumerate() {
            if !is_path_safe_id(&neighbor.id) {
                continue;
            }
            let Some(content) = fetched.succeeded.get(&neighbor.locator) else {
                continue;
            };
            let name = member_file_name(offset + 1, &neighbor.id, &self.config.extension);
            fs::write(dir.join(name), &content.bytes)?;
            members.push(neighbor.id.clone());
        }
        if members.len() == 1 && !sample.neighbors.is_empty() {
            warn!(
                "[curator:export] every neighbor of '{}' failed to load",
                main_id
            );
        }
        Ok(Some(members))
    }
}

fn discard_dir(dir: &Path) {
    if let Err(err) = fs::remove_dir_all(dir)
        && err.kind() != ErrorKind::NotFound
    {
        warn!(
            "[curator:export] could not remove partial unit {}: {}",
            dir.display(),
            err
        );
    }
}
