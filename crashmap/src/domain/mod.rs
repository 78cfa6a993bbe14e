//! Domain model for crashmap
//!
//! Core domain types and errors shared by every stage of a capture session.

pub mod errors;
pub mod types;

pub use errors::{MapsError, Result};
pub use types::{DumpMode, Pid};
