use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::coredump::dump_size;
use crate::domain::DumpMode;
use crate::maps::{MapRegistry, Protection, Region};

/// One region as written to JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub start: u64,
    pub end: u64,
    pub offset: u64,
    /// `rwx` form, e.g. `r-x`
    pub perms: String,
    pub shared: bool,
    /// Backed by a device node other than ashmem
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub device: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Only present once a lookup opened the module and its bias is non-zero
    #[serde(rename = "loadBias", skip_serializing_if = "Option::is_none")]
    pub load_bias: Option<u64>,
    /// Bytes a core written in the snapshot's mode would keep
    #[serde(rename = "dumpSize")]
    pub dump_size: u64,
}

impl RegionSnapshot {
    fn capture(region: &Region, mode: DumpMode) -> Self {
        Self {
            start: region.start,
            end: region.end,
            offset: region.offset,
            perms: region.prot.to_string(),
            shared: region.prot.contains(Protection::SHARED),
            device: region.is_device(),
            name: region.name.clone(),
            load_bias: region.load_bias(),
            dump_size: dump_size(region, mode),
        }
    }
}

/// Whole-registry snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSnapshot {
    pub pid: i32,
    pub mode: String,
    pub regions: Vec<RegionSnapshot>,
    #[serde(rename = "totalSize")]
    pub total_size: u64,
}

impl MapSnapshot {
    #[must_use]
    pub fn capture(registry: &MapRegistry, mode: DumpMode) -> Self {
        Self {
            pid: registry.pid().0,
            mode: mode.to_string(),
            regions: registry
                .iter()
                .map(|region| RegionSnapshot::capture(region, mode))
                .collect(),
            total_size: registry.total_size(),
        }
    }

    /// Write pretty-printed JSON
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn export<W: Write>(&self, mut writer: W) -> Result<()> {
        serde_json::to_writer_pretty(&mut writer, self)
            .context("Failed to serialize map snapshot")?;
        writer.flush().context("Failed to flush map snapshot")
    }
}
