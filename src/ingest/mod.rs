//! Ingestion stage.
//!
//! Turns a source's raw snapshot into a validated `CleanTable` and keeps the
//! master copy current:
//!
//! - critical-column resolution (`critical`)
//! - row cleaning and entity keys (`clean`)
//! - recency-window comparison against the master copy (`continuity`)
//! - the end-to-end run and its quality report (`engine`)

pub mod clean;
pub mod continuity;
pub mod critical;
pub mod engine;

pub use clean::*;
pub use continuity::*;
pub use critical::{ColumnOrigin, CriticalColumnSet};
pub use engine::*;
