//! Statistics output types and the availability bookkeeping.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::GeoLevel;
use crate::stats::StatFamily;

/// Why a requested statistic has no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The numeric capability the family needs is unavailable.
    DependencyUnavailable,
    /// Too few non-missing values.
    InsufficientData,
    /// The comparison period has no value.
    ReferenceMissing,
    /// Not meaningful at the source's periodicity.
    NotMeaningful,
    /// Mathematically undefined (zero denominator, zero variance).
    Undefined,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::DependencyUnavailable => "dependency_unavailable",
            SkipReason::InsufficientData => "insufficient_data",
            SkipReason::ReferenceMissing => "reference_missing",
            SkipReason::NotMeaningful => "not_meaningful",
            SkipReason::Undefined => "undefined",
        }
    }
}

/// Value or reason for one statistic.
pub type Outcome = Result<f64, SkipReason>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRecord {
    pub entity_id: String,
    pub level: GeoLevel,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub requested: Vec<String>,
    pub calculated: BTreeSet<String>,
    pub skipped: BTreeMap<String, SkipReason>,
}

impl AvailabilityReport {
    pub fn new(requested: &[&str]) -> Self {
        Self {
            requested: requested.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Record `outcome` for `name` in both the record and the report.
    ///
    /// Non-finite values are recorded as `undefined`, so a value in the
    /// record always has a matching "calculated" entry.
    pub fn settle(&mut self, record: &mut StatisticsRecord, name: &str, outcome: Outcome) {
        match finite(outcome) {
            Ok(v) => {
                record.values.insert(name.to_string(), v);
                self.skipped.remove(name);
                self.calculated.insert(name.to_string());
            }
            Err(reason) => {
                record.values.remove(name);
                self.calculated.remove(name);
                self.skipped.insert(name.to_string(), reason);
            }
        }
    }

    /// Every requested name is either calculated or skipped, and values match.
    pub fn is_consistent_with(&self, record: &StatisticsRecord) -> bool {
        let all_accounted = self
            .requested
            .iter()
            .all(|n| self.calculated.contains(n) != self.skipped.contains_key(n));
        let values_match = record.values.keys().all(|k| self.calculated.contains(k))
            && self.calculated.iter().all(|k| record.values.contains_key(k));
        all_accounted && values_match
    }
}

fn finite(outcome: Outcome) -> Outcome {
    outcome.and_then(|v| if v.is_finite() { Ok(v) } else { Err(SkipReason::Undefined) })
}

/// Point-in-time statistics as of one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodStatistics {
    pub period: NaiveDate,
    pub values: BTreeMap<String, f64>,
    pub skipped: BTreeMap<String, SkipReason>,
}

impl PeriodStatistics {
    pub fn new(period: NaiveDate) -> Self {
        Self {
            period,
            values: BTreeMap::new(),
            skipped: BTreeMap::new(),
        }
    }

    pub fn settle(&mut self, name: &str, outcome: Outcome) {
        match finite(outcome) {
            Ok(v) => {
                self.skipped.remove(name);
                self.values.insert(name.to_string(), v);
            }
            Err(reason) => {
                self.values.remove(name);
                self.skipped.insert(name.to_string(), reason);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStatistics {
    pub entity_id: String,
    pub name: String,
    /// Latest period with a value.
    pub as_of: Option<NaiveDate>,
    pub record: StatisticsRecord,
    pub availability: AvailabilityReport,
    /// Period-change and momentum statistics at every observed period, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<PeriodStatistics>,
}

/// Statistics for every entity of one level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelStatistics {
    pub level: GeoLevel,
    pub requested: Vec<String>,
    pub unavailable_families: Vec<StatFamily>,
    /// Skip counts per statistic and reason across the level.
    pub skip_counts: BTreeMap<String, BTreeMap<SkipReason, usize>>,
    pub entities: Vec<EntityStatistics>,
}

impl LevelStatistics {
    pub fn entity(&self, entity_id: &str) -> Option<&EntityStatistics> {
        self.entities.iter().find(|e| e.entity_id == entity_id)
    }

    pub(crate) fn tally_skips(&mut self) {
        let mut counts: BTreeMap<String, BTreeMap<SkipReason, usize>> = BTreeMap::new();
        for entity in &self.entities {
            for (name, reason) in &entity.availability.skipped {
                *counts.entry(name.clone()).or_default().entry(*reason).or_default() += 1;
            }
        }
        self.skip_counts = counts;
    }
}
