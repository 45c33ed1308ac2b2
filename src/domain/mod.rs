//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - source and hierarchy enums (`Geography`, `GeoLevel`, `SourceKey`, `Periodicity`)
//! - stage outcomes (`IngestStatus`, `StageStatus`)
//! - the cleaned wide table shared by ingestion and aggregation (`CleanTable`)
//! - run configuration (`PipelineConfig`, `ContinuityPolicy`)

pub mod table;
pub mod types;

pub use table::*;
pub use types::*;
