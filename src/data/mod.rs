//! Data sources.
//!
//! - the source registry and its built-in Zillow entries (`registry`)
//! - the `SourceDescriptor` seam plus registry-backed and static descriptors (`descriptor`)
//! - HTTP snapshot retrieval (`fetch`)
//! - deterministic synthetic snapshots for failed fetches (`fallback`)

pub mod descriptor;
pub mod fallback;
pub mod fetch;
pub mod registry;

pub use descriptor::*;
pub use fallback::*;
pub use fetch::*;
pub use registry::*;
