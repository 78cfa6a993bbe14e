//! Pre-flight checks for crashmap
//!
//! Confirms the target can be inspected before a capture starts, with
//! actionable error messages when it cannot.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::domain::Pid;

/// Check that the target process still exists
pub fn check_process_exists(pid: Pid) -> Result<()> {
    let proc_path = format!("/proc/{}", pid.0);
    if !Path::new(&proc_path).exists() {
        bail!(
            "Process {} not found.\n\n\
             The target may already have been reaped. Check with: ps -p {}",
            pid.0,
            pid.0
        );
    }
    Ok(())
}

/// Check that the target's mapping table is readable
pub fn check_maps_access(pid: Pid) -> Result<()> {
    let maps_path = pid.maps_path();
    std::fs::File::open(&maps_path).with_context(|| {
        format!(
            "Cannot read {maps_path}\n\n\
             This usually means:\n\
             - The process exited before the capture started\n\
             - Permission denied (run as the target's user or as root)\n\
             - /proc is not mounted"
        )
    })?;
    Ok(())
}

/// Warn when remote memory reads are likely to be refused
///
/// Returns the warning text instead of failing: the abort-message scan is
/// best-effort and simply finds nothing without access.
#[must_use]
pub fn memory_access_warning() -> Option<String> {
    if unsafe { libc::geteuid() } == 0 {
        return None;
    }

    let scope = std::fs::read_to_string("/proc/sys/kernel/yama/ptrace_scope").ok()?;
    match scope.trim().parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(level) => Some(format!(
            "ptrace_scope is {level}; reading target memory may be refused unless the \
             inspector is the target's tracer or runs as root"
        )),
    }
}
