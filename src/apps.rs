use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum, error::ErrorKind};

use crate::annotations::AnnotationLog;
use crate::cluster::TrainSize;
use crate::config::{ExportConfig, FetchConfig, SamplerConfig, StrategyConfig};
use crate::constants::cluster::{DEFAULT_CLUSTERS, DEFAULT_MAX_ITER};
use crate::constants::fetch::{DEFAULT_MAX_IN_FLIGHT, DEFAULT_TIMEOUT_SECS};
use crate::constants::layout::{DEFAULT_ANNOTATIONS_PATH, DEFAULT_EXPORT_DIR, DEFAULT_EXTENSION};
use crate::constants::sampler::DEFAULT_SEED;
use crate::export::{BatchExporter, ExportReport};
use crate::fetch::FetchPipeline;
use crate::index::InMemoryVectorIndex;
use crate::reconcile::{ImportReport, ReconciliationImporter};
use crate::session::CurationSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Uniform,
    Metadata,
    Cluster,
}

#[derive(Debug, Parser)]
#[command(
    name = "export_batches",
    disable_help_subcommand = true,
    about = "Export sampled units for manual curation",
    long_about = "Sample main items with their nearest neighbors and write each unit into its own directory, plus a samples.json manifest.",
    after_help = "Items already recorded as pos in the annotation log are never sampled again."
)]
struct ExportBatchesCli {
    #[arg(long, value_name = "PATH", help = "JSON file holding the vector index")]
    index: PathBuf,
    #[arg(
        long,
        value_name = "PATH",
        default_value = DEFAULT_ANNOTATIONS_PATH,
        help = "Annotation log; created when missing"
    )]
    annotations: PathBuf,
    #[arg(
        long,
        value_name = "DIR",
        default_value = DEFAULT_EXPORT_DIR,
        help = "Export root; must be missing or empty"
    )]
    out: PathBuf,
    #[arg(
        long,
        default_value_t = 100,
        value_parser = parse_positive_usize,
        help = "Upper bound on sampling attempts"
    )]
    dirs: usize,
    #[arg(long, default_value_t = 5, help = "Neighbors requested per main item")]
    nearest: usize,
    #[arg(long, value_enum, default_value = "uniform", help = "Sampling strategy")]
    strategy: StrategyArg,
    #[arg(
        long = "meta-field",
        value_name = "FIELD",
        help = "Metadata field forming the stratum key, repeat as needed"
    )]
    meta_fields: Vec<String>,
    #[arg(long, default_value_t = DEFAULT_CLUSTERS, help = "Clusters fitted by the cluster strategy")]
    clusters: usize,
    #[arg(long = "max-iter", default_value_t = DEFAULT_MAX_ITER, help = "K-means iteration cap")]
    max_iter: usize,
    #[arg(
        long = "train-size",
        value_parser = parse_train_size,
        default_value = "1.0",
        help = "Cluster training subsample: integer count or fraction in (0, 1]"
    )]
    train_size: TrainSize,
    #[arg(long, default_value_t = DEFAULT_SEED, help = "Deterministic sampling seed")]
    seed: u64,
    #[arg(long, default_value = DEFAULT_EXTENSION, help = "Extension of exported files")]
    extension: String,
    #[arg(long = "timeout-secs", default_value_t = DEFAULT_TIMEOUT_SECS, help = "Per-request fetch timeout")]
    timeout_secs: u64,
    #[arg(
        long = "max-in-flight",
        default_value_t = DEFAULT_MAX_IN_FLIGHT,
        value_parser = parse_positive_usize,
        help = "Concurrent fetch cap within one unit"
    )]
    max_in_flight: usize,
    #[arg(
        long = "strategy-config",
        value_name = "PATH",
        conflicts_with_all = ["strategy", "meta_fields", "clusters", "max_iter", "train_size"],
        help = "JSON file with a full strategy config (overrides strategy flags)"
    )]
    strategy_config: Option<PathBuf>,
}

#[derive(Debug, Parser)]
#[command(
    name = "import_annotations",
    disable_help_subcommand = true,
    about = "Import curated unit directories into the annotation log",
    long_about = "Files kept in a unit directory become pos, deleted ones become neg. Units whose main id is already annotated are skipped."
)]
struct ImportAnnotationsCli {
    #[arg(
        long,
        value_name = "PATH",
        default_value = DEFAULT_ANNOTATIONS_PATH,
        help = "Annotation log; created when missing"
    )]
    annotations: PathBuf,
    #[arg(
        long,
        value_name = "DIR",
        default_value = DEFAULT_EXPORT_DIR,
        help = "Export root holding unit directories and samples.json"
    )]
    out: PathBuf,
}

/// Sample, fetch, and export units from a JSON vector index.
pub fn run_export_batches<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();

    let Some(cli) = parse_cli::<ExportBatchesCli, _>(
        std::iter::once("export_batches".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let strategy = resolve_strategy(&cli)?;
    let index = Arc::new(InMemoryVectorIndex::load(&cli.index)?);
    let sampler_config = SamplerConfig {
        seed: cli.seed,
        strategy,
        ..SamplerConfig::default()
    };
    let mut session = CurationSession::open(index, &cli.annotations, sampler_config)?;

    let fetch_config = FetchConfig {
        timeout: Duration::from_secs(cli.timeout_secs),
        max_in_flight: cli.max_in_flight,
    };
    let exporter = BatchExporter::new(
        FetchPipeline::http(&fetch_config)?,
        ExportConfig {
            root: cli.out,
            attempts: cli.dirs,
            neighbors: cli.nearest,
            extension: cli.extension,
        },
    )?;
    let report = session.export(&exporter)?;
    print_export_report(&report);
    Ok(())
}

/// Reconcile curated unit directories into the annotation log.
pub fn run_import_annotations<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();

    let Some(cli) = parse_cli::<ImportAnnotationsCli, _>(
        std::iter::once("import_annotations".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let mut log = AnnotationLog::open(&cli.annotations)?;
    let report = ReconciliationImporter::new(&cli.out).run(&mut log)?;
    print_import_report(&report, log.path());
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn resolve_strategy(cli: &ExportBatchesCli) -> Result<StrategyConfig, Box<dyn Error>> {
    if let Some(path) = &cli.strategy_config {
        return load_strategy_config(path);
    }
    let strategy = match cli.strategy {
        StrategyArg::Uniform => StrategyConfig::Uniform,
        StrategyArg::Metadata => StrategyConfig::MetadataStratified {
            meta_fields: cli.meta_fields.clone(),
        },
        StrategyArg::Cluster => StrategyConfig::ClusterStratified {
            n_clusters: cli.clusters,
            max_iter: cli.max_iter,
            train_size: cli.train_size,
        },
    };
    strategy.validate()?;
    Ok(strategy)
}

fn load_strategy_config(path: &Path) -> Result<StrategyConfig, Box<dyn Error>> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed to read strategy config {}: {err}", path.display()))?;
    let strategy: StrategyConfig = serde_json::from_str(&raw)
        .map_err(|err| format!("invalid strategy config {}: {err}", path.display()))?;
    strategy.validate()?;
    Ok(strategy)
}

fn print_export_report(report: &ExportReport) {
    println!(
        "Exported {} units from {} attempts ({} discarded, {} neighbor fetches failed).",
        report.produced(),
        report.attempts,
        report.discarded.len(),
        report.neighbor_failures
    );
    if report.sample_failures > 0 || !report.unsafe_ids.is_empty() {
        println!(
            "Skipped {} attempts the index could not resolve and {} ids unusable as file names.",
            report.sample_failures,
            report.unsafe_ids.len()
        );
    }
    if report.exhausted {
        println!("Sampling pool exhausted before the attempt limit.");
    }
    println!("Manifest: {}", report.manifest_path.display());
    if let Some(coverage) = &report.coverage {
        println!("Stratum coverage ({} draws):", coverage.total);
        for entry in &coverage.per_stratum {
            println!(
                "  {:<40} {:>6} ({:.1}%)",
                entry.stratum,
                entry.count,
                entry.share * 100.0
            );
        }
    }
}

fn print_import_report(report: &ImportReport, log_path: &Path) {
    println!(
        "Imported {} units into {} ({} already annotated, {} without manifest entry, {} integrity warnings).",
        report.imported.len(),
        log_path.display(),
        report.already_annotated.len(),
        report.missing_from_manifest.len(),
        report.integrity_warnings
    );
    println!(
        "Annotated ids: {} -> {}",
        report.annotated_before, report.annotated_after
    );
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{}' as a positive integer", raw))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_train_size(raw: &str) -> Result<TrainSize, String> {
    let raw = raw.trim();
    if let Ok(count) = raw.parse::<usize>() {
        return Ok(TrainSize::Count(count));
    }
    let fraction = raw
        .parse::<f64>()
        .map_err(|_| format!("invalid train size '{raw}': expected an integer or a float"))?;
    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(format!("train size fraction must be in (0, 1], got {fraction}"));
    }
    Ok(TrainSize::Fraction(fraction))
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}
