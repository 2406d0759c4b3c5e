use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::annotations::AnnotationLog;
use crate::config::SamplerConfig;
use crate::data::{AnnotationRecord, SampleResult};
use crate::errors::CurationError;
use crate::export::{BatchExporter, ExportReport};
use crate::index::VectorIndex;
use crate::reconcile::{ImportReport, ReconciliationImporter};
use crate::sampler::NeighborSampler;

/// Application state shared by every curation operation.
///
/// Built once at startup: the annotation log is loaded and every id already
/// recorded as `pos` is excluded from the sampler before the first draw.
pub struct CurationSession {
    log: AnnotationLog,
    sampler: NeighborSampler,
}

impl CurationSession {
    /// Open the log at `log_path` (created when missing) and build the sampler.
    pub fn open(
        index: Arc<dyn VectorIndex>,
        log_path: impl Into<PathBuf>,
        config: SamplerConfig,
    ) -> Result<Self, CurationError> {
        let log = AnnotationLog::open(log_path)?;
        Self::new(index, log, config)
    }

    /// Build a session from an already-open log.
    pub fn new(
        index: Arc<dyn VectorIndex>,
        log: AnnotationLog,
        config: SamplerConfig,
    ) -> Result<Self, CurationError> {
        let mut sampler = NeighborSampler::new(index, config)?;
        let excluded = sampler.exclude(log.annotated_ids().iter());
        info!(
            "[curator:session] {} records loaded; {} annotated ids excluded, {} eligible",
            log.len(),
            excluded,
            sampler.eligible_len()
        );
        Ok(Self { log, sampler })
    }

    /// Draw the next unit with up to `k` neighbors.
    pub fn sample(&mut self, k: usize) -> Result<Option<SampleResult>, CurationError> {
        self.sampler.sample(k)
    }

    /// Append one completed record, persist the log, and exclude its `pos` ids.
    pub fn record(&mut self, record: AnnotationRecord) -> Result<(), CurationError> {
        self.sampler.exclude(record.pos.iter());
        self.log.append(record);
        self.log.save()
    }

    /// Run one export with this session's sampler.
    pub fn export(&mut self, exporter: &BatchExporter) -> Result<ExportReport, CurationError> {
        exporter.run(&mut self.sampler)
    }

    /// Import curated directories and exclude the newly annotated ids.
    pub fn import(
        &mut self,
        importer: &ReconciliationImporter,
    ) -> Result<ImportReport, CurationError> {
        let report = importer.run(&mut self.log)?;
        for (_, record) in &report.imported {
            self.sampler.exclude(record.pos.iter());
        }
        Ok(report)
    }

    /// Annotation log backing this session.
    pub fn log(&self) -> &AnnotationLog {
        &self.log
    }

    /// Live sampler.
    pub fn sampler(&self) -> &NeighborSampler {
        &self.sampler
    }
}
