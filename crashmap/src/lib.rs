//! # crashmap - Memory Map Model for Postmortem Capture
//!
//! After a process faults, a separate inspector freezes it and records what
//! is needed to debug the crash offline. crashmap is the part of that
//! inspector that models the crashed process's address space.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 /proc/<pid>/maps  (kernel text)                 │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ parse once, read-only afterwards
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         MapRegistry                             │
//! │          ordered, non-overlapping Regions (+ lazy modules)      │
//! └──────┬──────────────┬──────────────────┬──────────────┬────────┘
//!        │              │                  │              │
//!        ▼              ▼                  ▼              ▼
//! ┌────────────┐ ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//! │  Lookups   │ │ Abort-message│ │  Map report  │ │  Coredump    │
//! │ pc/symbol  │ │   locator    │ │   (text)     │ │  PT_LOADs    │
//! └────────────┘ └──────────────┘ └──────────────┘ └──────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`maps`]: `Region`, `MapRegistry` and the lookup engine
//! - [`symbolization`]: module images (ELF) for symbol and load-bias queries
//! - [`remote_memory`]: reading the stopped target's memory
//! - [`abort_message`]: signature scan for the abort-message buffer
//! - [`report`]: aligned human-readable memory map
//! - [`coredump`]: retention policy and program headers for a minimal core
//! - [`export`]: JSON snapshot of the registry
//! - [`cli`], [`preflight`]: command-line front end
//! - [`domain`]: `Pid`, `DumpMode` and `MapsError`
//!
//! ## Concurrency
//!
//! Everything here is synchronous and single-threaded. The target is
//! already stopped, so the registry is built once and never mutated; module
//! images are opened lazily through interior mutability and are not `Sync`.
//!
//! ## Typical Usage
//!
//! ```rust,ignore
//! let registry = MapRegistry::new(Pid(pid))?;
//! let abort_msg = registry.find_abort_message(&mut ProcessMemory::new(Pid(pid)));
//! report::write_report(&registry, &mut log_file)?;
//! coredump::write_program_headers(&registry, &mut core, data_offset, DumpMode::Native)?;
//! ```

pub mod abort_message;
pub mod cli;
pub mod coredump;
pub mod domain;
pub mod export;
pub mod maps;
pub mod preflight;
pub mod remote_memory;
pub mod report;
pub mod symbolization;

pub use domain::{DumpMode, MapsError, Pid};
pub use maps::{MapRegistry, Region};
