//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep a process id from being mixed up with the
//! many other integers that flow through a capture session.

use std::fmt;

/// Process ID
///
/// Identifies the crashed (frozen) process whose address space is modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub i32);

impl Pid {
    /// Path of the kernel's mapping table for this process
    #[must_use]
    pub fn maps_path(self) -> String {
        format!("/proc/{}/maps", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<i32> for Pid {
    fn from(pid: i32) -> Self {
        Pid(pid)
    }
}

/// Retention policy for the minimal core file
///
/// `Native` drops managed-runtime artifacts (compiled-code caches, dex
/// files, packaged archives); `JavaAware` keeps them so managed stacks can
/// be reconstructed from the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpMode {
    #[default]
    Native,
    JavaAware,
}

impl DumpMode {
    #[must_use]
    pub fn from_java_flag(java: bool) -> Self {
        if java {
            DumpMode::JavaAware
        } else {
            DumpMode::Native
        }
    }

    #[must_use]
    pub fn is_java_aware(self) -> bool {
        self == DumpMode::JavaAware
    }
}

impl fmt::Display for DumpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpMode::Native => f.write_str("native"),
            DumpMode::JavaAware => f.write_str("java-aware"),
        }
    }
}
