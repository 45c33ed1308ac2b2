//! `market-rollup` library crate.
//!
//! The binary (`rollup`) is a thin wrapper around this library so that:
//!
//! - each pipeline stage is testable without spawning processes or touching the network
//! - the ingestion, aggregation and statistics engines can be driven by other front-ends
//! - code stays easy to navigate as the project grows

pub mod aggregate;
pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod io;
pub mod math;
pub mod report;
pub mod stats;
