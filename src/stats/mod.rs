//! Statistics stage.
//!
//! Capability detection decides which families can run at all. Each entity of
//! a level then gets every requested statistic either calculated or skipped
//! with a reason; a failure in one statistic never takes down another.

pub mod capability;
pub mod catalog;
pub mod compute;
pub mod engine;
pub mod report;
pub mod series;

pub use capability::*;
pub use catalog::*;
pub use compute::*;
pub use engine::*;
pub use report::*;
pub use series::*;
