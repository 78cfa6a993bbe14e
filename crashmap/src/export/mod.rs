//! Registry export
//!
//! Serializes the memory map model to JSON for tooling that consumes a
//! capture after the inspector has exited.

pub mod snapshot;

pub use snapshot::{MapSnapshot, RegionSnapshot};
