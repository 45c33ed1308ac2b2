//! The three-stage pipeline: ingest -> aggregate -> statistics.
//!
//! Stages run strictly in order and each one records a `StageReport`. A stage
//! whose input is missing is reported as `NOT_RUN` rather than attempted.
//! The CLI and the integration tests both drive `run_pipeline`; only
//! `run_from_config` knows about registries and directories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::aggregate::{Aggregation, HierarchyMap, aggregate};
use crate::data::{RegistryDescriptor, SourceDescriptor, SourceRegistry, StaticDescriptor};
use crate::domain::{GeoLevel, PipelineConfig, SourceKey, StageStatus};
use crate::error::AppError;
use crate::ingest::{ContinuityViolation, IngestEngine, IngestOptions, IngestResult, IngestSummary};
use crate::io::{FileStore, VersionedStore, write_json, write_level_csv, write_statistics_csv};
use crate::stats::{
    CapabilitySet, LevelStatistics, SkipReason, StatFamily, StatisticsEngine, all_statistics, description, family_of,
    resolve_requested, series_for_level, series_from_table,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Aggregate,
    Statistics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    pub details: String,
    pub duration_ms: u64,
}

/// Top-level outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub source: SourceKey,
    pub started_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
    /// The first non-OK stage status, or OK.
    pub overall: StageStatus,
}

impl RunResult {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn exit_code(&self) -> u8 {
        self.overall.exit_code()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub run: RunResult,
    pub ingest: IngestResult,
    pub aggregation: Option<Aggregation>,
    pub statistics: Vec<LevelStatistics>,
}

/// Level-wide data quality counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelQuality {
    pub nodes: usize,
    pub unmapped: usize,
    pub conflicting_parents: usize,
    pub non_finite: usize,
}

/// Everything needed to judge the run's data quality, in one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub ingest: IngestSummary,
    pub warnings: Vec<String>,
    pub violations: Vec<ContinuityViolation>,
    pub aggregation: BTreeMap<GeoLevel, LevelQuality>,
    pub skipped_statistics: BTreeMap<GeoLevel, BTreeMap<String, BTreeMap<SkipReason, usize>>>,
}

impl QualityReport {
    pub fn from_output(output: &PipelineOutput) -> Self {
        let aggregation = output
            .aggregation
            .iter()
            .flat_map(|a| a.levels.values())
            .map(|l| {
                (
                    l.level,
                    LevelQuality {
                        nodes: l.nodes.len(),
                        unmapped: l.unmapped,
                        conflicting_parents: l.conflicting_parents,
                        non_finite: l.non_finite,
                    },
                )
            })
            .collect();
        let skipped_statistics = output
            .statistics
            .iter()
            .map(|s| (s.level, s.skip_counts.clone()))
            .collect();
        Self {
            ingest: output.ingest.summary.clone(),
            warnings: output.ingest.warnings.clone(),
            violations: output.ingest.violations.clone(),
            aggregation,
            skipped_statistics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticInfo {
    pub name: String,
    pub family: StatFamily,
    pub description: String,
    pub requested: bool,
    /// Calculated for at least one entity on some level.
    pub calculated: bool,
}

/// What a run produced and where, written next to the outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub source: SourceKey,
    pub started_at: DateTime<Utc>,
    pub overall: StageStatus,
    pub used_fallback: bool,
    pub levels: Vec<GeoLevel>,
    pub statistics: Vec<StatisticInfo>,
    pub unavailable_families: Vec<StatFamily>,
    /// Output files relative to the run directory.
    pub files: Vec<String>,
}

impl RunMetadata {
    pub fn from_output(output: &PipelineOutput, requested: &[&str], files: Vec<String>) -> Self {
        let statistics = all_statistics()
            .into_iter()
            .filter_map(|name| {
                Some(StatisticInfo {
                    name: name.to_string(),
                    family: family_of(name)?,
                    description: description(name)?.to_string(),
                    requested: requested.contains(&name),
                    calculated: output
                        .statistics
                        .iter()
                        .flat_map(|l| &l.entities)
                        .any(|e| e.availability.calculated.contains(name)),
                })
            })
            .collect();

        let mut unavailable_families: Vec<StatFamily> = output
            .statistics
            .iter()
            .flat_map(|l| l.unavailable_families.iter().copied())
            .collect();
        unavailable_families.sort();
        unavailable_families.dedup();

        Self {
            source: output.run.source.clone(),
            started_at: output.run.started_at,
            overall: output.run.overall,
            used_fallback: output.ingest.summary.used_fallback,
            levels: output
                .aggregation
                .iter()
                .flat_map(|a| a.levels.keys().copied())
                .collect(),
            statistics,
            unavailable_families,
            files,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Run every stage for `config.source` against `descriptor` and `store`.
///
/// Stage failures are reported in the returned `RunResult`; an `Err` is only
/// returned for configuration problems (e.g. unknown statistic names).
pub fn run_pipeline<D, S>(config: &PipelineConfig, descriptor: &D, store: &S) -> Result<PipelineOutput, AppError>
where
    D: SourceDescriptor + ?Sized,
    S: VersionedStore + ?Sized,
{
    let requested = resolve_requested(&config.statistics).map_err(AppError::config)?;
    let key = &config.source;
    let started_at = Utc::now();
    let mut stages = Vec::with_capacity(3);
    info!(source = %key, "pipeline started");

    // 1) Ingest.
    let t = Instant::now();
    let ingest = IngestEngine::new(descriptor, store, ingest_options(config)).ingest(key);
    let ingest_status = StageStatus::from(ingest.status);
    let ingest_details = match (&ingest.error, ingest.summary.used_fallback) {
        (Some(e), true) => format!("fetch failed, continued on synthetic data: {e}"),
        (Some(e), false) => e.clone(),
        (None, _) => format!(
            "{} entities x {} periods",
            ingest.summary.entities, ingest.summary.periods
        ),
    };
    stages.push(StageReport {
        stage: Stage::Ingest,
        status: ingest_status,
        details: ingest_details,
        duration_ms: millis(t.elapsed()),
    });

    // 2) Aggregate.
    let t = Instant::now();
    let aggregation = match &ingest.table {
        None => {
            stages.push(not_run(Stage::Aggregate, "ingest produced no table"));
            None
        }
        Some(table) => {
            let hierarchy = HierarchyMap::from_descriptor(descriptor);
            match aggregate(table, &hierarchy, &config.levels) {
                Ok(agg) => {
                    let nodes: usize = agg.levels.values().map(|l| l.nodes.len()).sum();
                    stages.push(StageReport {
                        stage: Stage::Aggregate,
                        status: StageStatus::Ok,
                        details: format!("{} levels, {nodes} nodes", agg.levels.len()),
                        duration_ms: millis(t.elapsed()),
                    });
                    Some(agg)
                }
                Err(err) => {
                    error!(error = %err, "aggregation failed");
                    stages.push(StageReport {
                        stage: Stage::Aggregate,
                        status: StageStatus::Failed,
                        details: err.to_string(),
                        duration_ms: millis(t.elapsed()),
                    });
                    None
                }
            }
        }
    };

    // 3) Statistics.
    let t = Instant::now();
    let statistics = match &aggregation {
        None => {
            stages.push(not_run(Stage::Statistics, "no aggregation available"));
            Vec::new()
        }
        Some(agg) => {
            let engine = StatisticsEngine::new(
                CapabilitySet::detect(&config.disabled_capabilities),
                requested,
                descriptor.periodicity(key),
            );
            let out: Vec<LevelStatistics> = agg
                .levels
                .values()
                .map(|level| {
                    // Leaf entities use their own observations.
                    let series = match (&ingest.table, level.level) {
                        (Some(table), GeoLevel::Zip) => series_from_table(table),
                        _ => series_for_level(level),
                    };
                    engine.calculate_level(level.level, &level.periods, &series)
                })
                .collect();
            let unavailable: Vec<&str> = engine.unavailable_families().iter().map(|f| f.as_str()).collect();
            let details = if unavailable.is_empty() {
                format!("{} levels", out.len())
            } else {
                format!("{} levels; unavailable families: {}", out.len(), unavailable.join(", "))
            };
            stages.push(StageReport {
                stage: Stage::Statistics,
                status: StageStatus::Ok,
                details,
                duration_ms: millis(t.elapsed()),
            });
            out
        }
    };

    let overall = stages
        .iter()
        .map(|s| s.status)
        .find(|s| !s.is_ok() && *s != StageStatus::NotRun)
        .unwrap_or(StageStatus::Ok);
    if overall.is_ok() {
        info!(source = %key, "pipeline finished");
    } else {
        warn!(source = %key, status = ?overall, "pipeline finished with failures");
    }

    Ok(PipelineOutput {
        run: RunResult {
            source: key.clone(),
            started_at,
            stages,
            overall,
        },
        ingest,
        aggregation,
        statistics,
    })
}

fn not_run(stage: Stage, details: &str) -> StageReport {
    StageReport {
        stage,
        status: StageStatus::NotRun,
        details: details.to_string(),
        duration_ms: 0,
    }
}

/// Write the run's files under `<output_dir>/<source slug>/` and return that directory.
///
/// Layout:
/// - `aggregations/<level>.json` and `aggregations/<level>.csv`
/// - `statistics/<level>.json` and `statistics/<level>.csv`
/// - `quality_report.json`
/// - `run_result.json`
/// - `metadata.json`, listing everything above
pub fn persist_outputs(config: &PipelineConfig, output: &PipelineOutput) -> Result<PathBuf, AppError> {
    let requested = resolve_requested(&config.statistics).map_err(AppError::config)?;
    let root = config.output_dir.join(config.source.slug());
    let mut files: Vec<String> = Vec::new();

    if let Some(agg) = &output.aggregation {
        for level in agg.levels.values() {
            let name = level.level.as_str();
            let json = format!("aggregations/{name}.json");
            write_json(&root.join(&json), level)?;
            let csv = format!("aggregations/{name}.csv");
            write_level_csv(&root.join(&csv), level)?;
            files.extend([json, csv]);
        }
    }
    for stats in &output.statistics {
        let name = stats.level.as_str();
        let json = format!("statistics/{name}.json");
        write_json(&root.join(&json), stats)?;
        let csv = format!("statistics/{name}.csv");
        write_statistics_csv(&root.join(&csv), stats)?;
        files.extend([json, csv]);
    }
    write_json(&root.join("quality_report.json"), &QualityReport::from_output(output))?;
    write_json(&root.join("run_result.json"), &output.run)?;
    files.extend(["quality_report.json".to_string(), "run_result.json".to_string()]);

    write_json(
        &root.join("metadata.json"),
        &RunMetadata::from_output(output, &requested, files),
    )?;

    info!(dir = %root.display(), "outputs written");
    Ok(root)
}

/// The built-in registry, or the JSON registry at `path`.
pub fn load_registry(path: Option<&Path>) -> Result<SourceRegistry, AppError> {
    match path {
        Some(path) => SourceRegistry::from_json_file(path),
        None => Ok(SourceRegistry::builtin()),
    }
}

/// A local CSV when `--input` is given, otherwise the registry over HTTP.
pub fn build_descriptor(config: &PipelineConfig) -> Result<Box<dyn SourceDescriptor>, AppError> {
    if let Some(path) = &config.input_path {
        let descriptor = StaticDescriptor::from_csv_path(path)
            .map_err(|e| AppError::config(format!("Failed to read input '{}': {e}", path.display())))?;
        return Ok(Box::new(descriptor));
    }
    let registry = load_registry(config.registry_path.as_deref())?;
    let descriptor = RegistryDescriptor::new(registry, Duration::from_secs(config.fetch_timeout_secs))?;
    Ok(Box::new(descriptor))
}

/// Build the descriptor and store from `config`, run every stage and
/// persist the outputs.
pub fn run_from_config(config: &PipelineConfig) -> Result<PipelineOutput, AppError> {
    let descriptor = build_descriptor(config)?;
    let store = FileStore::new(&config.data_dir);
    let output = run_pipeline(config, descriptor.as_ref(), &store)?;
    persist_outputs(config, &output)?;
    Ok(output)
}

/// Ingestion only: fetch, validate and update the master copy (unless
/// `config.validate_only`).
///
/// The ingest quality report is still written to `quality_report.json`.
pub fn ingest_from_config(config: &PipelineConfig) -> Result<IngestResult, AppError> {
    let descriptor = build_descriptor(config)?;
    let store = FileStore::new(&config.data_dir);
    let result = IngestEngine::new(descriptor.as_ref(), &store, ingest_options(config)).ingest(&config.source);
    let path = config.output_dir.join(config.source.slug()).join("quality_report.json");
    write_json(&path, &result.summary)?;
    Ok(result)
}

fn ingest_options(config: &PipelineConfig) -> IngestOptions {
    IngestOptions {
        allow_fallback: config.allow_fallback,
        fallback_rows: config.fallback_rows,
        fallback_seed: config.fallback_seed,
        as_of: config.as_of,
        continuity: config.continuity,
        validate_only: config.validate_only,
    }
}

/// `Err` carrying the run's exit code when the overall status is not OK.
pub fn ensure_success(run: &RunResult) -> Result<(), AppError> {
    if run.overall.is_ok() {
        return Ok(());
    }
    let detail = run
        .stages
        .iter()
        .find(|s| s.status == run.overall)
        .map(|s| s.details.as_str())
        .unwrap_or("");
    Err(AppError::new(
        run.exit_code(),
        format!("Run finished with status {:?}: {detail}", run.overall),
    ))
}
