//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - handed from one pipeline stage to the next in memory
//! - persisted as master copies and run outputs
//! - reloaded later by reporting layers

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Geography of a fetched source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Geography {
    Zip,
    City,
    County,
    State,
    Metro,
    Neighborhood,
}

impl Geography {
    pub const ALL: [Geography; 6] = [
        Geography::Zip,
        Geography::City,
        Geography::County,
        Geography::State,
        Geography::Metro,
        Geography::Neighborhood,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Geography::Zip => "zip",
            Geography::City => "city",
            Geography::County => "county",
            Geography::State => "state",
            Geography::Metro => "metro",
            Geography::Neighborhood => "neighborhood",
        }
    }

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            Geography::Zip => "ZIP Code",
            Geography::City => "City",
            Geography::County => "County",
            Geography::State => "State",
            Geography::Metro => "Metro",
            Geography::Neighborhood => "Neighborhood",
        }
    }
}

impl fmt::Display for Geography {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level of the rollup hierarchy `ZIP → City → County → State → StateRegion → Region`.
///
/// Variants are declared finest first, so `Ord` follows the bottom-up
/// processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GeoLevel {
    Zip,
    City,
    County,
    State,
    StateRegion,
    Region,
}

impl GeoLevel {
    pub const ALL: [GeoLevel; 6] = [
        GeoLevel::Zip,
        GeoLevel::City,
        GeoLevel::County,
        GeoLevel::State,
        GeoLevel::StateRegion,
        GeoLevel::Region,
    ];

    /// Next-coarser level, `None` at the root.
    pub fn parent(self) -> Option<GeoLevel> {
        match self {
            GeoLevel::Zip => Some(GeoLevel::City),
            GeoLevel::City => Some(GeoLevel::County),
            GeoLevel::County => Some(GeoLevel::State),
            GeoLevel::State => Some(GeoLevel::StateRegion),
            GeoLevel::StateRegion => Some(GeoLevel::Region),
            GeoLevel::Region => None,
        }
    }

    /// Next-finer level, `None` at the leaf.
    pub fn child(self) -> Option<GeoLevel> {
        match self {
            GeoLevel::Zip => None,
            GeoLevel::City => Some(GeoLevel::Zip),
            GeoLevel::County => Some(GeoLevel::City),
            GeoLevel::State => Some(GeoLevel::County),
            GeoLevel::StateRegion => Some(GeoLevel::State),
            GeoLevel::Region => Some(GeoLevel::StateRegion),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GeoLevel::Zip => "zip",
            GeoLevel::City => "city",
            GeoLevel::County => "county",
            GeoLevel::State => "state",
            GeoLevel::StateRegion => "state_region",
            GeoLevel::Region => "region",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            GeoLevel::Zip => "ZIP Code",
            GeoLevel::City => "City",
            GeoLevel::County => "County",
            GeoLevel::State => "State",
            GeoLevel::StateRegion => "State Region",
            GeoLevel::Region => "Region",
        }
    }
}

impl fmt::Display for GeoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite key into the flat source registry: `(provider, dataset, variant, geography)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceKey {
    pub provider: String,
    pub dataset: String,
    pub variant: String,
    pub geography: Geography,
}

impl SourceKey {
    pub fn new(
        provider: impl Into<String>,
        dataset: impl Into<String>,
        variant: impl Into<String>,
        geography: Geography,
    ) -> Self {
        Self {
            provider: provider.into(),
            dataset: dataset.into(),
            variant: variant.into(),
            geography,
        }
    }

    /// Filesystem-safe identifier, e.g. `zillow_zhvi_all_homes_zip`.
    pub fn slug(&self) -> String {
        let raw = format!(
            "{}_{}_{}_{}",
            self.provider, self.dataset, self.variant, self.geography
        );
        raw.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c.to_ascii_lowercase() } else { '_' })
            .collect()
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.provider, self.dataset, self.variant, self.geography
        )
    }
}

/// Native reporting frequency of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Periodicity {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Annual,
    Irregular,
}

impl Periodicity {
    pub fn supports_month_over_month(self) -> bool {
        matches!(self, Periodicity::Daily | Periodicity::Weekly | Periodicity::Monthly)
    }

    pub fn supports_quarter_over_quarter(self) -> bool {
        matches!(
            self,
            Periodicity::Daily | Periodicity::Weekly | Periodicity::Monthly | Periodicity::Quarterly
        )
    }
}

/// Optional numeric capability a statistic family may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Third/fourth central moments (skewness, kurtosis).
    Moments,
    /// Least-squares regression (trend slope, R²).
    Regression,
    /// Interpolated order statistics (percentiles, IQR, value-at-risk).
    Quantiles,
}

impl Capability {
    pub const ALL: [Capability; 3] = [Capability::Moments, Capability::Regression, Capability::Quantiles];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Moments => "moments",
            Capability::Regression => "regression",
            Capability::Quantiles => "quantiles",
        }
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestStatus {
    Ok,
    /// Fetch failed; the cleaned table is synthetic and was not committed.
    OkWithFallbackData,
    FetchFailed,
    SchemaInvalid,
    ContinuityViolation,
    /// The master copy could not be read or written.
    StoreFailed,
}

/// Status of one pipeline stage in the run result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Ok,
    FetchFailed,
    SchemaInvalid,
    ContinuityViolation,
    /// A stage-wide failure (empty input, unreadable store).
    Failed,
    /// Not started because an earlier stage failed.
    NotRun,
}

impl StageStatus {
    pub fn is_ok(self) -> bool {
        self == StageStatus::Ok
    }

    /// Process exit code reported when this status decides the run.
    pub fn exit_code(self) -> u8 {
        match self {
            StageStatus::Ok | StageStatus::NotRun => 0,
            StageStatus::SchemaInvalid | StageStatus::Failed => 3,
            StageStatus::FetchFailed => 4,
            StageStatus::ContinuityViolation => 5,
        }
    }
}

impl From<IngestStatus> for StageStatus {
    fn from(value: IngestStatus) -> Self {
        match value {
            IngestStatus::Ok => StageStatus::Ok,
            IngestStatus::OkWithFallbackData | IngestStatus::FetchFailed => StageStatus::FetchFailed,
            IngestStatus::SchemaInvalid => StageStatus::SchemaInvalid,
            IngestStatus::ContinuityViolation => StageStatus::ContinuityViolation,
            IngestStatus::StoreFailed => StageStatus::Failed,
        }
    }
}

/// Tolerance settings for the master-copy continuity check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContinuityPolicy {
    /// Maximum relative change allowed inside the recency window.
    pub tolerance: f64,
    /// Number of most recent shared periods that are checked.
    pub window: usize,
    /// Floor for the relative-change denominator.
    pub epsilon: f64,
}

impl Default for ContinuityPolicy {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            window: 12,
            epsilon: 1e-9,
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags, `ROLLUP_*` environment variables and defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source: SourceKey,
    /// Directory holding master copies.
    pub data_dir: PathBuf,
    /// Directory receiving aggregation/statistics output.
    pub output_dir: PathBuf,
    /// Optional JSON registry replacing the built-in one.
    pub registry_path: Option<PathBuf>,
    /// Local CSV used instead of fetching from the registry URL.
    pub input_path: Option<PathBuf>,
    pub fetch_timeout_secs: u64,

    pub allow_fallback: bool,
    pub fallback_rows: usize,
    pub fallback_seed: u64,
    /// Last period of synthetic fallback tables.
    pub as_of: NaiveDate,

    pub continuity: ContinuityPolicy,
    /// Run every ingest check but leave the master copy untouched.
    pub validate_only: bool,

    /// Statistic or family names; empty means everything.
    pub statistics: Vec<String>,
    pub disabled_capabilities: Vec<Capability>,
    pub levels: Vec<GeoLevel>,
}

impl PipelineConfig {
    /// Defaults for everything except the source key.
    pub fn new(source: SourceKey, as_of: NaiveDate) -> Self {
        Self {
            source,
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            registry_path: None,
            input_path: None,
            fetch_timeout_secs: 30,
            allow_fallback: true,
            fallback_rows: 50,
            fallback_seed: 42,
            as_of,
            continuity: ContinuityPolicy::default(),
            validate_only: false,
            statistics: Vec::new(),
            disabled_capabilities: Vec::new(),
            levels: GeoLevel::ALL.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_walks_both_directions() {
        let mut level = GeoLevel::Zip;
        let mut seen = vec![level];
        while let Some(parent) = level.parent() {
            assert_eq!(parent.child(), Some(level));
            seen.push(parent);
            level = parent;
        }
        assert_eq!(seen, GeoLevel::ALL.to_vec());
    }

    #[test]
    fn slug_is_filesystem_safe() {
        let key = SourceKey::new("Zillow", "zhvi", "all homes/raw", Geography::Zip);
        assert_eq!(key.slug(), "zillow_zhvi_all_homes_raw_zip");
    }

    #[test]
    fn fallback_ingest_maps_to_fetch_failed_stage() {
        assert_eq!(StageStatus::from(IngestStatus::OkWithFallbackData), StageStatus::FetchFailed);
        assert_eq!(StageStatus::from(IngestStatus::Ok).exit_code(), 0);
        assert_eq!(StageStatus::ContinuityViolation.exit_code(), 5);
    }
}
