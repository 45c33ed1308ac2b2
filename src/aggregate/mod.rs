//! Aggregation stage: ZIP → City → County → State → StateRegion → Region.
//!
//! - hierarchy tables and row placement (`hierarchy`)
//! - per-period reductions (`reduce`)
//! - the parallel, level-by-level rollup (`engine`)

pub mod engine;
pub mod hierarchy;
pub mod reduce;

pub use engine::*;
pub use hierarchy::*;
pub use reduce::*;
