//! Structured error types for crashmap
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Lookup misses (module, symbol, abort-message signature) are not errors;
//! they surface as `None`.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapsError {
    #[error("Out of memory while building the memory map")]
    AllocationFailure,

    #[error("Failed to read {path}: {source}")]
    SystemFailure {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid mapping on line {line}: {reason}")]
    InvalidRegion { line: usize, reason: String },

    #[error("Mapping at 0x{start:x} starts before the previous one ends (0x{prev_end:x})")]
    UnorderedRegions { prev_end: u64, start: u64 },

    #[error("Segment data for 0x{vaddr:x} would end past the largest file offset")]
    OffsetOverflow { vaddr: u64 },

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<std::collections::TryReserveError> for MapsError {
    fn from(_: std::collections::TryReserveError) -> Self {
        MapsError::AllocationFailure
    }
}

pub type Result<T, E = MapsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_failure_display() {
        let err = MapsError::SystemFailure {
            path: "/proc/1234/maps".to_string(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/proc/1234/maps"));
    }

    #[test]
    fn test_offset_overflow_display() {
        let err = MapsError::OffsetOverflow { vaddr: 0x7000 };
        assert!(err.to_string().contains("0x7000"));
    }

    #[test]
    fn test_short_write_display() {
        let err = MapsError::ShortWrite {
            written: 10,
            expected: 56,
        };
        assert_eq!(err.to_string(), "Short write: 10 of 56 bytes");
    }

    #[test]
    fn test_try_reserve_maps_to_allocation_failure() {
        let mut v: Vec<u64> = Vec::new();
        let err: MapsError = v.try_reserve(usize::MAX).unwrap_err().into();
        assert!(matches!(err, MapsError::AllocationFailure));
    }
}
