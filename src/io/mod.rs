//! Input/output helpers.
//!
//! - raw CSV snapshots and period-header parsing (`snapshot`)
//! - master copy storage with optimistic concurrency (`master`)
//! - run output files (JSON/CSV) (`export`)

pub mod export;
pub mod master;
pub mod snapshot;

pub use export::*;
pub use master::*;
pub use snapshot::*;
