//! A single contiguous mapping in the target's address space
//!
//! Regions are produced by the registry from `/proc/<pid>/maps` lines and
//! own their lazily opened module image, if any.

use std::cell::OnceCell;
use std::fmt;

use thiserror::Error;

use crate::domain::Pid;
use crate::symbolization::{ModuleImage, ModuleLoader};

/// Permission bits decoded from the four-character `rwxp` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Protection(u32);

impl Protection {
    pub const NONE: Protection = Protection(0);
    pub const READ: Protection = Protection(0x1);
    pub const WRITE: Protection = Protection(0x2);
    pub const EXEC: Protection = Protection(0x4);
    /// `s` in the fourth column; not part of the `rwx` triple
    pub const SHARED: Protection = Protection(0x8);

    /// Decode a permission string such as `r-xp`
    ///
    /// # Errors
    /// Returns an error unless the string is exactly four characters drawn
    /// from `r`/`-`, `w`/`-`, `x`/`-`, `p`/`s`.
    pub fn parse(perms: &str) -> Result<Self, RegionError> {
        let bytes = perms.as_bytes();
        if bytes.len() != 4 {
            return Err(RegionError::BadPermissions(perms.to_string()));
        }

        let mut prot = Protection::NONE;
        for (idx, (&c, (set, bit))) in bytes
            .iter()
            .zip([(b'r', Self::READ), (b'w', Self::WRITE), (b'x', Self::EXEC)])
            .enumerate()
        {
            match c {
                b'-' => {}
                c if c == set => prot |= bit,
                _ => {
                    return Err(RegionError::BadPermissions(format!(
                        "{perms} (column {idx})"
                    )))
                }
            }
        }
        match bytes[3] {
            b'p' => {}
            b's' => prot |= Self::SHARED,
            _ => return Err(RegionError::BadPermissions(format!("{perms} (column 3)"))),
        }

        Ok(prot)
    }

    #[must_use]
    pub fn contains(self, other: Protection) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn readable(self) -> bool {
        self.contains(Self::READ)
    }

    #[must_use]
    pub fn writable(self) -> bool {
        self.contains(Self::WRITE)
    }

    #[must_use]
    pub fn executable(self) -> bool {
        self.contains(Self::EXEC)
    }

    /// The `rwx` bits without the sharing flag
    #[must_use]
    pub fn access(self) -> Protection {
        Protection(self.0 & (Self::READ.0 | Self::WRITE.0 | Self::EXEC.0))
    }
}

impl std::ops::BitOr for Protection {
    type Output = Protection;

    fn bitor(self, rhs: Protection) -> Protection {
        Protection(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Protection {
    fn bitor_assign(&mut self, rhs: Protection) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Protection {
    /// Three-character `rwx` form used by the map report
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.readable() { 'r' } else { '-' };
        let w = if self.writable() { 'w' } else { '-' };
        let x = if self.executable() { 'x' } else { '-' };
        write!(f, "{r}{w}{x}")
    }
}

/// Why a mapping line could not become a [`Region`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    #[error("bad permission string {0:?}")]
    BadPermissions(String),

    #[error("empty or inverted range 0x{start:x}-0x{end:x}")]
    EmptyRange { start: u64, end: u64 },
}

/// One `/proc/<pid>/maps` entry
///
/// The half-open range `[start, end)` is never empty. The module image is
/// opened at most once, on first request, and dropped with the region.
pub struct Region {
    pub start: u64,
    pub end: u64,
    pub offset: u64,
    pub prot: Protection,
    pub name: Option<String>,
    device: bool,
    module: OnceCell<Option<Box<dyn ModuleImage>>>,
}

impl Region {
    /// Build a region from already-split mapping fields
    ///
    /// `name` is trimmed; an empty name means an unnamed anonymous mapping.
    ///
    /// # Errors
    /// Returns an error for an invalid permission string or an empty range.
    pub fn new(
        start: u64,
        end: u64,
        offset: u64,
        perms: &str,
        name: &str,
    ) -> Result<Self, RegionError> {
        if start >= end {
            return Err(RegionError::EmptyRange { start, end });
        }
        let prot = Protection::parse(perms)?;

        let name = name.trim();
        let name = if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };
        let device = name
            .as_deref()
            .is_some_and(|n| n.starts_with("/dev/") && !n.starts_with("/dev/ashmem"));

        Ok(Self {
            start,
            end,
            offset,
            prot,
            name,
            device,
            module: OnceCell::new(),
        })
    }

    /// Check if an address falls within this region
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }

    /// Backed by a device node (other than ashmem); never opened as a module
    #[must_use]
    pub fn is_device(&self) -> bool {
        self.device
    }

    /// Return the module image, opening it through `loader` on first use
    ///
    /// A failed open is remembered as well, so the loader runs at most once.
    pub fn module(&self, loader: &dyn ModuleLoader, pid: Pid) -> Option<&dyn ModuleImage> {
        let slot = self.module.get_or_init(|| {
            if self.device {
                None
            } else {
                loader.load(self, pid)
            }
        });
        match slot {
            Some(image) => Some(image.as_ref()),
            None => None,
        }
    }

    /// The module image if an earlier lookup already opened it
    #[must_use]
    pub fn loaded_module(&self) -> Option<&dyn ModuleImage> {
        match self.module.get() {
            Some(Some(image)) => Some(image.as_ref()),
            _ => None,
        }
    }

    /// Install a module image directly, bypassing any loader
    ///
    /// Returns false, leaving the region untouched, if a lookup already ran.
    pub fn attach_module(&self, image: Box<dyn ModuleImage>) -> bool {
        self.module.set(Some(image)).is_ok()
    }

    /// Load bias of an already opened module, if non-zero
    #[must_use]
    pub fn load_bias(&self) -> Option<u64> {
        self.loaded_module()
            .map(|image| image.load_bias())
            .filter(|&bias| bias != 0)
    }

    /// Convert a runtime pc inside this region to a module-relative pc
    #[must_use]
    pub fn relative_pc(&self, image: &dyn ModuleImage, pc: u64) -> u64 {
        pc.wrapping_sub(self.start)
            .wrapping_add(image.load_bias())
            .wrapping_add(self.offset)
    }

    /// Convert a module-relative address to a runtime address in this region
    #[must_use]
    pub fn absolute_pc(&self, image: &dyn ModuleImage, rel: u64) -> u64 {
        self.start
            .wrapping_add(rel)
            .wrapping_sub(image.load_bias())
            .wrapping_sub(self.offset)
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("start", &format_args!("0x{:x}", self.start))
            .field("end", &format_args!("0x{:x}", self.end))
            .field("offset", &format_args!("0x{:x}", self.offset))
            .field("prot", &format_args!("{}", self.prot))
            .field("name", &self.name)
            .field("module_loaded", &self.loaded_module().is_some())
            .finish()
    }
}
