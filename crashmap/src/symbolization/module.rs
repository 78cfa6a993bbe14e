//! Module images backing file-mapped regions
//!
//! A [`ModuleLoader`] opens the binary behind a region; the resulting
//! [`ModuleImage`] answers symbol and load-bias queries. The default
//! implementation parses ELF files with `object`.

use std::fs;

use log::debug;
use object::{Object, ObjectSegment, ObjectSymbol, SegmentFlags, SymbolKind};
use rustc_demangle::demangle;

use crate::domain::Pid;
use crate::maps::Region;

/// Parsed binary behind one region
pub trait ModuleImage {
    /// Link-time (module-relative) address of `name`
    fn symbol_address(&self, name: &str) -> Option<u64>;

    /// Difference between link-time and file-offset addresses of the
    /// executable segment
    fn load_bias(&self) -> u64;

    /// Symbol covering a module-relative address and the distance into it
    fn symbol_at(&self, _rel_pc: u64) -> Option<(String, u64)> {
        None
    }
}

/// Opens module images for regions
pub trait ModuleLoader {
    /// `None` means the region has no usable image; this is not an error.
    fn load(&self, region: &Region, pid: Pid) -> Option<Box<dyn ModuleImage>>;
}

/// Never opens anything
///
/// Useful when only the map model is wanted and symbol lookups should miss.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoModules;

impl ModuleLoader for NoModules {
    fn load(&self, _region: &Region, _pid: Pid) -> Option<Box<dyn ModuleImage>> {
        None
    }
}

/// Loads ELF images from disk
///
/// Tries the mapped path first and falls back to the kernel's
/// `/proc/<pid>/map_files/<start>-<end>` link, which still works when the
/// file was deleted or lives in another mount namespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectLoader;

impl ModuleLoader for ObjectLoader {
    fn load(&self, region: &Region, pid: Pid) -> Option<Box<dyn ModuleImage>> {
        let name = region.name()?;
        // Pseudo-names like [stack] or [anon:...] have no backing file
        if !name.starts_with('/') {
            return None;
        }

        let data = fs::read(name)
            .or_else(|_| {
                let map_file = format!(
                    "/proc/{}/map_files/{:x}-{:x}",
                    pid.0, region.start, region.end
                );
                fs::read(map_file)
            })
            .map_err(|e| debug!("Cannot read module {name}: {e}"))
            .ok()?;

        match ElfImage::parse(data) {
            Ok(image) => Some(Box::new(image)),
            Err(e) => {
                debug!("Cannot parse module {name}: {e}");
                None
            }
        }
    }
}

/// A symbol table entry kept after parsing
#[derive(Debug, Clone)]
struct SymbolEntry {
    name: String,
    address: u64,
    size: u64,
}

/// ELF image parsed with `object`
///
/// Symbols from `.symtab` and `.dynsym` are copied out at parse time so the
/// file bytes need not be kept alive.
#[derive(Debug, Clone)]
pub struct ElfImage {
    load_bias: u64,
    /// Sorted by address
    symbols: Vec<SymbolEntry>,
}

impl ElfImage {
    /// Parse an in-memory ELF file
    ///
    /// # Errors
    /// Returns an error if the bytes are not a readable object file.
    pub fn parse(data: Vec<u8>) -> object::Result<Self> {
        let obj = object::File::parse(&*data)?;

        let load_bias = obj
            .segments()
            .find(|segment| match segment.flags() {
                SegmentFlags::Elf { p_flags } => p_flags & object::elf::PF_X != 0,
                _ => false,
            })
            .map_or(0, |segment| segment.address().wrapping_sub(segment.file_range().0));

        // .symtab wins over .dynsym for duplicate names since it is visited first
        let mut symbols: Vec<SymbolEntry> = obj
            .symbols()
            .chain(obj.dynamic_symbols())
            .filter(|sym| {
                sym.is_definition() && matches!(sym.kind(), SymbolKind::Text | SymbolKind::Data)
            })
            .filter_map(|sym| {
                let name = sym.name().ok()?;
                if name.is_empty() {
                    return None;
                }
                Some(SymbolEntry {
                    name: name.to_string(),
                    address: sym.address(),
                    size: sym.size(),
                })
            })
            .collect();
        symbols.sort_by_key(|sym| sym.address);

        Ok(Self { load_bias, symbols })
    }
}

impl ModuleImage for ElfImage {
    fn symbol_address(&self, name: &str) -> Option<u64> {
        self.symbols
            .iter()
            .find(|sym| sym.name == name)
            .map(|sym| sym.address)
    }

    fn load_bias(&self) -> u64 {
        self.load_bias
    }

    fn symbol_at(&self, rel_pc: u64) -> Option<(String, u64)> {
        let idx = self.symbols.partition_point(|sym| sym.address <= rel_pc);
        let sym = self.symbols[..idx].iter().rev().find(|sym| {
            sym.size == 0 || rel_pc < sym.address.saturating_add(sym.size)
        })?;
        Some((format!("{:#}", demangle(&sym.name)), rel_pc - sym.address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current_exe_image() -> ElfImage {
        let exe = std::env::current_exe().expect("Failed to get current exe");
        ElfImage::parse(fs::read(exe).expect("Failed to read test binary"))
            .expect("Failed to parse test binary")
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ElfImage::parse(b"not an elf".to_vec()).is_err());
    }

    #[test]
    fn test_missing_symbol() {
        let image = current_exe_image();
        assert!(image.symbol_address("crashmap_symbol_that_does_not_exist").is_none());
    }

    #[test]
    fn test_symbol_at_round_trip() {
        let image = current_exe_image();
        // Test binaries are not stripped and rustc always emits a C main
        let addr = image.symbol_address("main").expect("test binary should define main");
        assert_ne!(addr, 0);
        let (name, delta) = image.symbol_at(addr).expect("main should cover its own address");
        assert_eq!(delta, 0);
        assert!(!name.is_empty());
    }

    #[test]
    fn test_no_modules_loader() {
        let region = Region::new(0x1000, 0x2000, 0, "r-xp", "/lib/x.so").unwrap();
        assert!(NoModules.load(&region, Pid(1)).is_none());
    }

    #[test]
    fn test_object_loader_skips_pseudo_names() {
        let region = Region::new(0x1000, 0x2000, 0, "rw-p", "[anon:abort message]").unwrap();
        assert!(ObjectLoader.load(&region, Pid(1)).is_none());
    }
}
