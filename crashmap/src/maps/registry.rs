//! Memory map registry built from `/proc/<pid>/maps`
//!
//! The registry is built once per capture session and is read-only
//! afterwards. Regions keep the kernel's ascending, non-overlapping order.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, info};

use super::region::Region;
use crate::domain::{MapsError, Pid, Result};
use crate::symbolization::{ModuleLoader, ObjectLoader};

/// Ordered model of one process's address space
pub struct MapRegistry {
    pid: Pid,
    regions: Vec<Region>,
    loader: Box<dyn ModuleLoader>,
}

impl MapRegistry {
    /// Read and parse `/proc/<pid>/maps`
    ///
    /// # Errors
    /// `SystemFailure` if the table cannot be opened or read,
    /// `AllocationFailure` on memory exhaustion, and `InvalidRegion` /
    /// `UnorderedRegions` if a matching line cannot become a region.
    pub fn new(pid: Pid) -> Result<Self> {
        Self::from_path(pid, pid.maps_path())
    }

    /// Parse a mapping table saved at `path` as if it belonged to `pid`
    ///
    /// # Errors
    /// Same as [`MapRegistry::new`].
    pub fn from_path<P: AsRef<Path>>(pid: Pid, path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| MapsError::SystemFailure {
            path: path.display().to_string(),
            source,
        })?;

        Self::read_table(pid, BufReader::new(file), &path.display().to_string())
    }

    /// Parse a mapping table from any buffered reader
    ///
    /// # Errors
    /// Same as [`MapRegistry::new`].
    pub fn from_reader<R: BufRead>(pid: Pid, reader: R) -> Result<Self> {
        Self::read_table(pid, reader, "<reader>")
    }

    fn read_table<R: BufRead>(pid: Pid, reader: R, source_name: &str) -> Result<Self> {
        // Regions parsed so far are dropped (with any module) on every early return
        let mut regions: Vec<Region> = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| MapsError::SystemFailure {
                path: source_name.to_string(),
                source,
            })?;
            let line_no = idx + 1;

            let Some(fields) = parse_line(&line) else {
                debug!("Skipping unrecognized maps line {line_no}: {line:?}");
                continue;
            };

            let region =
                Region::new(fields.start, fields.end, fields.offset, fields.perms, fields.name)
                    .map_err(|e| MapsError::InvalidRegion {
                        line: line_no,
                        reason: e.to_string(),
                    })?;

            if let Some(prev) = regions.last() {
                if region.start < prev.end {
                    return Err(MapsError::UnorderedRegions {
                        prev_end: prev.end,
                        start: region.start,
                    });
                }
            }

            regions.try_reserve(1)?;
            regions.push(region);
        }

        info!("Parsed {} memory regions for {pid} from {source_name}", regions.len());
        Ok(Self {
            pid,
            regions,
            loader: Box::new(ObjectLoader),
        })
    }

    /// Replace the module loader used for symbol lookups
    #[must_use]
    pub fn with_loader(mut self, loader: Box<dyn ModuleLoader>) -> Self {
        self.loader = loader;
        self
    }

    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    /// Sum of every region's mapped size
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.regions.iter().map(Region::size).sum()
    }

    pub(crate) fn loader(&self) -> &dyn ModuleLoader {
        self.loader.as_ref()
    }
}

impl<'a> IntoIterator for &'a MapRegistry {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

impl std::fmt::Debug for MapRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapRegistry")
            .field("pid", &self.pid)
            .field("regions", &self.regions)
            .finish_non_exhaustive()
    }
}

/// Fields of one recognized mapping line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapsLine<'a> {
    pub start: u64,
    pub end: u64,
    pub perms: &'a str,
    pub offset: u64,
    pub name: &'a str,
}

/// Split a maps line: `start-end perms offset dev:dev inode [name]`
///
/// Returns `None` for anything that does not fit the grammar; device and
/// inode are checked for shape but not kept. The name is trimmed.
#[must_use]
pub fn parse_line(line: &str) -> Option<MapsLine<'_>> {
    let (range, rest) = next_field(line)?;
    let (perms, rest) = next_field(rest)?;
    let (offset, rest) = next_field(rest)?;
    let (dev, rest) = next_field(rest)?;
    let (inode, rest) = next_field(rest)?;

    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    if perms.len() != 4 {
        return None;
    }
    let offset = u64::from_str_radix(offset, 16).ok()?;

    let (major, minor) = dev.split_once(':')?;
    u32::from_str_radix(major, 16).ok()?;
    u32::from_str_radix(minor, 16).ok()?;
    inode.parse::<u64>().ok()?;

    Some(MapsLine {
        start,
        end,
        perms,
        offset,
        name: rest.trim(),
    })
}

/// Next whitespace-delimited token and the unconsumed remainder
fn next_field(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    Some(s.split_once(char::is_whitespace).unwrap_or((s, "")))
}
