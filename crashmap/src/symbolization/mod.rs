//! # Module Images and Symbol Resolution
//!
//! Backtrace reconstruction needs to move between two address spaces:
//! **runtime addresses** seen in the crashed process and **link-time
//! addresses** recorded in the module's symbol table. This module provides
//! the per-module half of that translation; the per-region half lives on
//! [`Region`](crate::maps::Region).
//!
//! ## Load Bias
//!
//! The executable `PT_LOAD` segment of a shared object is linked at some
//! `p_vaddr` but stored at file offset `p_offset`. The difference is the
//! module's **load bias**:
//!
//! ```text
//! load_bias = p_vaddr - p_offset
//! ```
//!
//! A region mapping the file at `offset` and starting at `start` then maps:
//!
//! ```text
//! rel_pc = pc - start + offset + load_bias
//! pc     = start + rel_pc - load_bias - offset
//! ```
//!
//! ## Laziness
//!
//! Parsing a module is the expensive part of a capture, and most regions are
//! never asked about. Each region therefore opens its image on the first
//! lookup and keeps it (or the failure) until the registry is dropped.
//!
//! ## Module Structure
//!
//! - **`module`**: the [`ModuleLoader`] / [`ModuleImage`] seams and the
//!   default ELF implementation on top of `object`
//!
//! ## Example
//!
//! ```rust,ignore
//! let registry = MapRegistry::new(pid)?;
//! if let Some(addr) = registry.resolve_symbol("/system/lib64/libc.so", "abort") {
//!     println!("abort is at 0x{addr:x}");
//! }
//! ```

pub mod module;

pub use module::{ElfImage, ModuleImage, ModuleLoader, NoModules, ObjectLoader};
