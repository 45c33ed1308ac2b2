//! Ingestion run: fetch → resolve schema → clean → continuity → commit.
//!
//! Failures do not propagate as `Err`; every outcome is folded into an
//! `IngestResult` whose status says whether downstream stages may proceed.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::{FallbackSpec, SourceDescriptor, synthetic_snapshot};
use crate::domain::{CleanTable, ContinuityPolicy, IngestStatus, SourceKey};
use crate::error::IngestError;
use crate::ingest::{
    CleanStats, ContinuityReport, ContinuityViolation, CriticalColumnSet, check_continuity, clean, critical,
};
use crate::io::{MasterCopy, VersionedStore};

/// Violations listed individually in warnings before summarizing the rest.
const WARN_VIOLATION_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub allow_fallback: bool,
    pub fallback_rows: usize,
    pub fallback_seed: u64,
    pub as_of: NaiveDate,
    pub continuity: ContinuityPolicy,
    /// Run fetch, schema and continuity checks without writing the master copy.
    pub validate_only: bool,
}

/// Quality report for one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub source: SourceKey,
    pub status: IngestStatus,
    pub ingested_at: DateTime<Utc>,
    pub used_fallback: bool,
    pub critical_columns: Option<CriticalColumnSet>,
    pub missing_columns: Vec<String>,
    pub clean: CleanStats,
    pub entities: usize,
    pub periods: usize,
    pub first_period: Option<NaiveDate>,
    pub last_period: Option<NaiveDate>,
    pub observations: usize,
    /// Share of non-missing cells, in percent.
    pub completeness_pct: f64,
    pub continuity: Option<ContinuityReport>,
    pub master_copy: Option<String>,
    pub committed: bool,
}

#[derive(Debug, Clone)]
pub struct IngestResult {
    pub status: IngestStatus,
    /// Present whenever downstream stages may run.
    pub table: Option<CleanTable>,
    pub master_copy_path: Option<String>,
    pub warnings: Vec<String>,
    pub violations: Vec<ContinuityViolation>,
    pub summary: IngestSummary,
    /// Message of the error that decided the status, if any.
    pub error: Option<String>,
}

impl IngestResult {
    pub fn is_usable(&self) -> bool {
        self.table.is_some()
    }
}

pub struct IngestEngine<'a, D: ?Sized, S: ?Sized> {
    descriptor: &'a D,
    store: &'a S,
    options: IngestOptions,
}

impl<'a, D, S> IngestEngine<'a, D, S>
where
    D: SourceDescriptor + ?Sized,
    S: VersionedStore + ?Sized,
{
    pub fn new(descriptor: &'a D, store: &'a S, options: IngestOptions) -> Self {
        Self {
            descriptor,
            store,
            options,
        }
    }

    pub fn ingest(&self, key: &SourceKey) -> IngestResult {
        let now = Utc::now();
        let mut run = Run::new(key.clone(), now);

        let raw = match self.descriptor.fetch_raw(key) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(source = %key, error = %err, "fetch failed");
                if !self.options.allow_fallback {
                    return run.fail(IngestStatus::FetchFailed, IngestError::from(err));
                }
                run.warn(format!("fetch failed ({err}); continuing with synthetic fallback data"));
                run.error = Some(err.to_string());
                run.summary.used_fallback = true;

                let set = critical::resolve(self.descriptor, key.geography, None);
                synthetic_snapshot(&FallbackSpec {
                    key,
                    critical_columns: &set.columns,
                    rows: self.options.fallback_rows,
                    seed: self.options.fallback_seed,
                    as_of: self.options.as_of,
                })
            }
        };

        let set = critical::resolve(self.descriptor, key.geography, Some(&raw));
        let missing = set.missing_from(&raw);
        run.summary.critical_columns = Some(set.clone());
        if !missing.is_empty() {
            run.summary.missing_columns = missing.clone();
            return run.fail(IngestStatus::SchemaInvalid, IngestError::Schema { missing });
        }

        let (table, stats) = clean(&raw, &set);
        run.record_table(&table, stats);
        info!(
            source = %key,
            entities = table.rows.len(),
            periods = table.periods.len(),
            "cleaned snapshot"
        );

        if run.summary.used_fallback {
            return run.finish(IngestStatus::OkWithFallbackData, table);
        }

        match self.commit(key, &table, now, &mut run) {
            Ok(()) => run.finish(IngestStatus::Ok, table),
            Err(err @ IngestError::Continuity { .. }) => run.fail(IngestStatus::ContinuityViolation, err),
            Err(err) => run.fail(IngestStatus::StoreFailed, err),
        }
    }

    fn commit(
        &self,
        key: &SourceKey,
        table: &CleanTable,
        now: DateTime<Utc>,
        run: &mut Run,
    ) -> Result<(), IngestError> {
        let location = self.store.location(key);
        run.summary.master_copy = Some(location.clone());

        match self.store.load(key)? {
            None if self.options.validate_only => {
                info!(location = %location, "validate only: no master copy to compare against");
                return Ok(());
            }
            None => {
                let copy = MasterCopy::from_table(key, table, now);
                if !self.store.compare_and_swap(key, None, &copy)? {
                    return Err(IngestError::Conflict {
                        expected: "<none>".to_string(),
                    });
                }
                info!(location = %location, "created master copy");
            }
            Some((master, version)) => {
                let report = check_continuity(&master, table, &self.options.continuity);
                debug!(
                    compared = report.compared,
                    window = report.window.len(),
                    "continuity check"
                );
                let violations = report.violations.clone();
                run.summary.continuity = Some(report);
                if !violations.is_empty() {
                    for v in violations.iter().take(WARN_VIOLATION_LIMIT) {
                        run.warn(format!("continuity violation: {v}"));
                    }
                    if violations.len() > WARN_VIOLATION_LIMIT {
                        run.warn(format!(
                            "... and {} more continuity violations",
                            violations.len() - WARN_VIOLATION_LIMIT
                        ));
                    }
                    run.violations = violations.clone();
                    return Err(IngestError::Continuity { violations });
                }
                if self.options.validate_only {
                    info!(location = %location, "validate only: continuity ok, master copy left as is");
                    return Ok(());
                }

                let merged = master.merged_with(table, now);
                if !self.store.compare_and_swap(key, Some(&version), &merged)? {
                    return Err(IngestError::Conflict {
                        expected: version.to_string(),
                    });
                }
                info!(location = %location, "updated master copy");
            }
        }

        run.summary.committed = true;
        Ok(())
    }
}

/// Accumulates the pieces of an `IngestResult` while a run progresses.
struct Run {
    summary: IngestSummary,
    warnings: Vec<String>,
    violations: Vec<ContinuityViolation>,
    error: Option<String>,
}

impl Run {
    fn new(source: SourceKey, now: DateTime<Utc>) -> Self {
        Self {
            summary: IngestSummary {
                source,
                status: IngestStatus::Ok,
                ingested_at: now,
                used_fallback: false,
                critical_columns: None,
                missing_columns: Vec::new(),
                clean: CleanStats::default(),
                entities: 0,
                periods: 0,
                first_period: None,
                last_period: None,
                observations: 0,
                completeness_pct: 0.0,
                continuity: None,
                master_copy: None,
                committed: false,
            },
            warnings: Vec::new(),
            violations: Vec::new(),
            error: None,
        }
    }

    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }

    fn record_table(&mut self, table: &CleanTable, stats: CleanStats) {
        let cells = table.rows.len() * table.periods.len();
        let observations = table.observation_count();
        self.summary.entities = table.rows.len();
        self.summary.periods = table.periods.len();
        self.summary.first_period = table.periods.first().copied();
        self.summary.last_period = table.periods.last().copied();
        self.summary.observations = observations;
        self.summary.completeness_pct = if cells == 0 {
            0.0
        } else {
            observations as f64 / cells as f64 * 100.0
        };
        if stats.coerced_missing > 0 {
            self.warnings.push(format!(
                "{} non-numeric value(s) treated as missing",
                stats.coerced_missing
            ));
        }
        if stats.dropped_duplicate > 0 {
            self.warnings.push(format!("{} duplicate row(s) dropped", stats.dropped_duplicate));
        }
        self.summary.clean = stats;
    }

    fn finish(mut self, status: IngestStatus, table: CleanTable) -> IngestResult {
        self.summary.status = status;
        IngestResult {
            status,
            table: Some(table),
            master_copy_path: self.summary.master_copy.clone(),
            warnings: self.warnings,
            violations: self.violations,
            summary: self.summary,
            error: self.error,
        }
    }

    fn fail(mut self, status: IngestStatus, err: IngestError) -> IngestResult {
        warn!(status = ?status, error = %err, "ingestion failed");
        self.summary.status = status;
        IngestResult {
            status,
            table: None,
            master_copy_path: self.summary.master_copy.clone(),
            warnings: self.warnings,
            violations: self.violations,
            summary: self.summary,
            error: Some(err.to_string()),
        }
    }
}
