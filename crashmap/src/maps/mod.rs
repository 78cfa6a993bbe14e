//! Process memory map model
//!
//! - **`region`**: one `/proc/<pid>/maps` entry and its lazily opened module
//! - **`registry`**: parsing the mapping table into an ordered registry
//! - **`lookup`**: address, neighbour and symbol queries

pub mod lookup;
pub mod region;
pub mod registry;

pub use lookup::FrameLocation;
pub use region::{Protection, Region, RegionError};
pub use registry::{parse_line, MapRegistry, MapsLine};
