//! Command-line parsing for the market data rollup.
//!
//! Argument parsing and command dispatch stay separate from the stage
//! engines. Every run option can also come from a `ROLLUP_*` environment
//! variable (a `.env` file is loaded first).

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::data::{DEFAULT_DATASET, DEFAULT_PROVIDER, DEFAULT_VARIANT};
use crate::domain::{Capability, ContinuityPolicy, GeoLevel, Geography, PipelineConfig, SourceKey};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "rollup", version, about = "Market data ingestion, geographic rollup and statistics")]
pub struct Cli {
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest, aggregate and compute statistics for one source.
    Run(RunArgs),
    /// Only ingest: fetch, validate and update the master copy.
    Ingest(IngestArgs),
    /// List the sources in the registry.
    Sources {
        /// JSON registry to use instead of the built-in one.
        #[arg(long, env = "ROLLUP_REGISTRY")]
        registry: Option<PathBuf>,
    },
    /// Detect numeric capabilities and print their status.
    Capabilities {
        /// Capabilities to treat as unavailable.
        #[arg(long, value_enum, value_delimiter = ',')]
        disable: Vec<Capability>,
    },
}

/// Options shared by `run` and `ingest`.
#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[arg(long, env = "ROLLUP_PROVIDER", default_value = DEFAULT_PROVIDER)]
    pub provider: String,

    #[arg(long, env = "ROLLUP_DATASET", default_value = DEFAULT_DATASET)]
    pub dataset: String,

    #[arg(long, env = "ROLLUP_VARIANT", default_value = DEFAULT_VARIANT)]
    pub variant: String,

    #[arg(short, long, env = "ROLLUP_GEOGRAPHY", value_enum, default_value_t = Geography::Zip)]
    pub geography: Geography,

    /// Directory holding master copies.
    #[arg(long, env = "ROLLUP_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory receiving run outputs.
    #[arg(long, env = "ROLLUP_OUTPUT_DIR", default_value = "output")]
    pub output_dir: PathBuf,

    /// JSON registry to use instead of the built-in one.
    #[arg(long, env = "ROLLUP_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Read the snapshot from a local CSV instead of fetching it.
    #[arg(short, long, env = "ROLLUP_INPUT")]
    pub input: Option<PathBuf>,

    /// HTTP timeout for the snapshot fetch.
    #[arg(long, env = "ROLLUP_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Fail instead of continuing on synthetic data when the fetch fails.
    #[arg(long, env = "ROLLUP_NO_FALLBACK")]
    pub no_fallback: bool,

    /// Rows in a synthetic fallback table.
    #[arg(long, env = "ROLLUP_FALLBACK_ROWS", default_value_t = 50)]
    pub fallback_rows: usize,

    /// Seed for synthetic fallback data.
    #[arg(long, env = "ROLLUP_SEED", default_value_t = 42)]
    pub seed: u64,

    /// Last period of synthetic fallback data (YYYY-MM-DD); defaults to today.
    #[arg(long, env = "ROLLUP_AS_OF", value_parser = parse_date)]
    pub as_of: Option<NaiveDate>,

    /// Maximum relative revision allowed inside the continuity window.
    #[arg(long, env = "ROLLUP_TOLERANCE", default_value_t = 0.01)]
    pub tolerance: f64,

    /// Number of most recent shared periods checked for continuity.
    #[arg(long, env = "ROLLUP_WINDOW", default_value_t = 12)]
    pub window: usize,

    /// Statistics or families to compute (comma-separated); default all.
    #[arg(long, env = "ROLLUP_STATS", value_delimiter = ',')]
    pub stats: Vec<String>,

    /// Numeric capabilities to treat as unavailable.
    #[arg(long, env = "ROLLUP_DISABLE", value_enum, value_delimiter = ',')]
    pub disable: Vec<Capability>,

    /// Levels to aggregate (comma-separated); default all.
    #[arg(long, env = "ROLLUP_LEVELS", value_enum, value_delimiter = ',')]
    pub levels: Vec<GeoLevel>,
}

#[derive(Debug, Args, Clone)]
pub struct IngestArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Check schema and continuity without updating the master copy.
    #[arg(long, env = "ROLLUP_VALIDATE_ONLY")]
    pub validate_only: bool,
}

impl IngestArgs {
    pub fn to_config(&self, today: NaiveDate) -> PipelineConfig {
        let mut config = self.run.to_config(today);
        config.validate_only = self.validate_only;
        config
    }
}

impl RunArgs {
    pub fn source_key(&self) -> SourceKey {
        SourceKey::new(&self.provider, &self.dataset, &self.variant, self.geography)
    }

    pub fn to_config(&self, today: NaiveDate) -> PipelineConfig {
        let mut config = PipelineConfig::new(self.source_key(), self.as_of.unwrap_or(today));
        config.data_dir = self.data_dir.clone();
        config.output_dir = self.output_dir.clone();
        config.registry_path = self.registry.clone();
        config.input_path = self.input.clone();
        config.fetch_timeout_secs = self.timeout_secs;
        config.allow_fallback = !self.no_fallback;
        config.fallback_rows = self.fallback_rows;
        config.fallback_seed = self.seed;
        config.continuity = ContinuityPolicy {
            tolerance: self.tolerance,
            window: self.window,
            ..ContinuityPolicy::default()
        };
        config.statistics = self.stats.clone();
        config.disabled_capabilities = self.disable.clone();
        if !self.levels.is_empty() {
            config.levels = self.levels.clone();
        }
        config
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}
