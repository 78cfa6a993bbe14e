//! Program headers for a minimal core file
//!
//! One `PT_LOAD` record is emitted per region, in registry order. `p_memsz`
//! is always the full mapping, while `p_filesz` follows a retention policy
//! that drops regions which are unreadable, recoverable from disk, or known
//! to be bulky and useless for postmortem analysis. File offsets are a
//! running sum of the included sizes starting at the caller's data offset.
//!
//! The memory contents themselves are copied by whoever assembles the file.

#![allow(unsafe_code)] // sysconf requires unsafe

use std::io::{self, Write};
use std::mem::size_of;

use log::{debug, warn};
use object::elf::{FileHeader64, ProgramHeader64, PF_R, PF_W, PF_X, PT_LOAD};
use object::endian::{Endianness, U32, U64};

use crate::domain::{DumpMode, MapsError, Result};
use crate::maps::{MapRegistry, Protection, Region};

/// Size of one ELF64 program header
pub const PHDR_SIZE: usize = size_of::<ProgramHeader64<Endianness>>();
/// Size of the ELF64 file header
pub const EHDR_SIZE: usize = size_of::<FileHeader64<Endianness>>();

/// Name fragments never worth capturing
const EXCLUDED_NAMES: &[&str] = &[
    ".db",
    ".crc",
    ".hyb",
    ".dat",
    ".ttf",
    ".lock",
    ".relro",
    ".db-shm",
    ".data",
    ".otf",
    "anon_inode:dmabuf",
    "Cookies",
    "[vectors]",
    "event-log-tags",
    "settings_config",
    "thread signal stack",
];

/// Android runtime artifacts, kept only for Java-aware dumps
const RUNTIME_NAMES: &[&str] = &[
    "jit-cache",
    ".art",
    ".oat",
    ".vdex",
    ".odex",
    ".dex",
    ".apk",
    ".jar",
    "/data/dalvik-cache",
    "/dev/ashmem",
    "/dev/__properties__",
    "anon:dalvik",
];

/// Bytes of `region` to copy into the core file under `mode`
#[must_use]
pub fn dump_size(region: &Region, mode: DumpMode) -> u64 {
    let prot = region.prot;
    if !prot.readable() && !prot.writable() {
        return 0;
    }

    match region.name() {
        Some(_) if prot.executable() => return 0,
        Some(name) => {
            if let Some(hit) = EXCLUDED_NAMES.iter().find(|pat| name.contains(*pat)) {
                debug!("Excluding {name} from core (matches {hit})");
                return 0;
            }
            if !mode.is_java_aware() && RUNTIME_NAMES.iter().any(|pat| name.contains(pat)) {
                debug!("Excluding runtime artifact {name} from native core");
                return 0;
            }
        }
        None if !prot.writable() => return 0,
        None => {}
    }

    region.size()
}

/// ELF `p_flags` for a region's permissions
#[must_use]
pub fn segment_flags(prot: Protection) -> u32 {
    let mut flags = 0;
    if prot.readable() {
        flags |= PF_R;
    }
    if prot.writable() {
        flags |= PF_W;
    }
    if prot.executable() {
        flags |= PF_X;
    }
    flags
}

/// System page size, used as `p_align`
#[must_use]
pub fn page_size() -> u64 {
    // SAFETY: sysconf has no memory-safety preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    u64::try_from(size)
        .ok()
        .filter(|&size| size > 0)
        .unwrap_or(4096)
}

/// File offset of the first segment's contents when the core file holds an
/// ELF header, one `PT_NOTE` and one `PT_LOAD` per region
#[must_use]
pub fn default_data_offset(region_count: usize) -> u64 {
    (EHDR_SIZE + (region_count + 1) * PHDR_SIZE) as u64
}

/// One `PT_LOAD` record before serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSegment {
    pub offset: u64,
    pub vaddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub flags: u32,
    pub align: u64,
}

impl LoadSegment {
    /// Native-endian ELF64 program header
    #[must_use]
    pub fn to_phdr(&self) -> ProgramHeader64<Endianness> {
        let e = Endianness::default();
        ProgramHeader64 {
            p_type: U32::new(e, PT_LOAD),
            p_flags: U32::new(e, self.flags),
            p_offset: U64::new(e, self.offset),
            p_vaddr: U64::new(e, self.vaddr),
            p_paddr: U64::new(e, 0),
            p_filesz: U64::new(e, self.filesz),
            p_memsz: U64::new(e, self.memsz),
            p_align: U64::new(e, self.align),
        }
    }
}

/// Lay out one `PT_LOAD` per region starting at `data_offset`
///
/// # Errors
/// `OffsetOverflow` if the running file offset no longer fits in a `u64`.
pub fn program_headers(
    registry: &MapRegistry,
    data_offset: u64,
    mode: DumpMode,
) -> Result<Vec<LoadSegment>> {
    let align = page_size();
    let mut offset = data_offset;
    let mut segments = Vec::with_capacity(registry.len());

    for region in registry {
        let segment = LoadSegment {
            offset,
            vaddr: region.start,
            filesz: dump_size(region, mode),
            memsz: region.size(),
            flags: segment_flags(region.prot),
            align,
        };
        offset = offset
            .checked_add(segment.filesz)
            .ok_or(MapsError::OffsetOverflow {
                vaddr: region.start,
            })?;
        segments.push(segment);
    }

    Ok(segments)
}

/// What [`write_program_headers`] emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoredumpSummary {
    pub headers: usize,
    pub header_bytes: u64,
    /// Sum of `p_filesz` over all headers
    pub content_size: u64,
    /// First file offset after the last segment's contents
    pub next_offset: u64,
}

/// Single `write` that must take the whole buffer; only EINTR is retried
fn write_once<W: Write + ?Sized>(out: &mut W, buf: &[u8]) -> io::Result<usize> {
    loop {
        match out.write(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}

/// Write every region's program header to `out`, then a size summary line
///
/// # Errors
/// `OffsetOverflow` before anything is written if the layout does not fit.
/// `ShortWrite` (or the underlying I/O error) if a header is not accepted
/// in full; no further headers are written. A failure writing the summary
/// line is only reported to `out` and logged.
pub fn write_program_headers<W: Write + ?Sized>(
    registry: &MapRegistry,
    out: &mut W,
    data_offset: u64,
    mode: DumpMode,
) -> Result<CoredumpSummary> {
    let segments = program_headers(registry, data_offset, mode)?;
    let mut summary = CoredumpSummary {
        headers: 0,
        header_bytes: 0,
        content_size: 0,
        next_offset: data_offset,
    };

    for segment in segments {
        let phdr = segment.to_phdr();
        let bytes = object::pod::bytes_of(&phdr);

        let failure = match write_once(out, bytes) {
            Ok(n) if n == bytes.len() => None,
            Ok(n) => Some(MapsError::ShortWrite {
                written: n,
                expected: bytes.len(),
            }),
            Err(e) => Some(MapsError::Io(e)),
        };
        if let Some(err) = failure {
            warn!("Coredump aborted at segment 0x{:x}: {err}", segment.vaddr);
            let _ = out.write_all(b"coredump error: program header write failed\n");
            return Err(err);
        }

        summary.headers += 1;
        summary.header_bytes += bytes.len() as u64;
        summary.content_size += segment.filesz;
        summary.next_offset = segment.offset + segment.filesz;
    }

    let total_kb = summary.header_bytes / 1024;
    if let Err(e) = write!(out, "    TOTAL SIZE: 0x{total_kb:x}K ({total_kb}K)\n\n") {
        warn!("Failed to record coredump total size: {e}");
        let _ = out.write_all(b"coredump error: total size record failed\n");
    }

    Ok(summary)
}
