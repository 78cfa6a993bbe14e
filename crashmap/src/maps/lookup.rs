//! Address and symbol lookups over a [`MapRegistry`]
//!
//! Every miss is `None`; symbol resolution is best-effort and never fails
//! the capture.

// String formatting intentionally uses format! for clarity
#![allow(clippy::format_push_string)]

use log::debug;

use super::region::Region;
use super::registry::MapRegistry;

impl MapRegistry {
    /// Region containing `pc`, scanning in address order
    #[must_use]
    pub fn find_containing(&self, pc: u64) -> Option<&Region> {
        self.iter().find(|region| region.contains(pc))
    }

    /// Region immediately before `region` in the registry
    ///
    /// Returns `None` for the first region and for regions that do not
    /// belong to this registry.
    #[must_use]
    pub fn previous(&self, region: &Region) -> Option<&Region> {
        let regions = self.regions();
        let idx = regions.binary_search_by_key(&region.start, |r| r.start).ok()?;
        if !std::ptr::eq(&regions[idx], region) {
            return None;
        }
        idx.checked_sub(1).map(|prev| &regions[prev])
    }

    /// Runtime address of `symbol` in the module mapped from `pathname`
    ///
    /// Only the first region with that exact name is consulted, even if it
    /// lacks the symbol and a later segment of the same file would have it.
    #[must_use]
    pub fn resolve_symbol(&self, pathname: &str, symbol: &str) -> Option<u64> {
        let Some(region) = self.iter().find(|region| region.has_name(pathname)) else {
            debug!("No mapping named {pathname}");
            return None;
        };

        let Some(image) = region.module(self.loader(), self.pid()) else {
            debug!("No module image for {pathname}");
            return None;
        };

        let Some(rel) = image.symbol_address(symbol) else {
            debug!("Symbol {symbol} not found in {pathname}");
            return None;
        };

        Some(region.absolute_pc(image, rel))
    }

    /// Describe where `pc` lands, for one backtrace frame
    #[must_use]
    pub fn locate_pc(&self, pc: u64) -> Option<FrameLocation<'_>> {
        let region = self.find_containing(pc)?;

        let image = region
            .name()
            .and_then(|_| region.module(self.loader(), self.pid()));
        let (rel_pc, symbol) = match image {
            Some(image) => {
                let rel = region.relative_pc(image, pc);
                (rel, image.symbol_at(rel))
            }
            None => (pc.wrapping_sub(region.start).wrapping_add(region.offset), None),
        };

        Some(FrameLocation {
            pc,
            rel_pc,
            region,
            symbol,
        })
    }
}

/// Where a pc falls in the crashed process
#[derive(Debug)]
pub struct FrameLocation<'a> {
    pub pc: u64,
    /// Module-relative pc, or the file offset when no image is available
    pub rel_pc: u64,
    pub region: &'a Region,
    /// Demangled symbol name and the offset into it
    pub symbol: Option<(String, u64)>,
}

impl FrameLocation<'_> {
    /// Format like a tombstone backtrace line
    ///
    /// `#00 pc 0000000000001234  /lib/x.so (foo+0x10)`
    #[must_use]
    pub fn format(&self, frame_num: usize) -> String {
        let name = self.region.name().unwrap_or("<anonymous>");
        let mut output = format!("#{frame_num:02} pc {:016x}  {name}", self.rel_pc);

        if let Some((ref symbol, delta)) = self.symbol {
            output.push_str(&format!(" ({symbol}+0x{delta:x})"));
        }
        if let Some(bias) = self.region.load_bias() {
            output.push_str(&format!(" (load bias 0x{bias:x})"));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::Pid;
    use crate::maps::{MapRegistry, Region};
    use crate::symbolization::{ModuleImage, ModuleLoader};

    struct TableImage {
        bias: u64,
        symbols: Vec<(&'static str, u64)>,
    }

    impl ModuleImage for TableImage {
        fn symbol_address(&self, name: &str) -> Option<u64> {
            self.symbols
                .iter()
                .find(|(n, _)| *n == name)
                .map(|&(_, addr)| addr)
        }

        fn load_bias(&self) -> u64 {
            self.bias
        }

        fn symbol_at(&self, rel_pc: u64) -> Option<(String, u64)> {
            self.symbols
                .iter()
                .filter(|&&(_, addr)| addr <= rel_pc)
                .max_by_key(|&&(_, addr)| addr)
                .map(|&(name, addr)| (name.to_string(), rel_pc - addr))
        }
    }

    /// Opens an image only for regions mapped at file offset zero
    struct FirstSegmentLoader;

    impl ModuleLoader for FirstSegmentLoader {
        fn load(&self, region: &Region, _pid: Pid) -> Option<Box<dyn ModuleImage>> {
            if region.offset != 0 {
                return None;
            }
            Some(Box::new(TableImage {
                bias: 0,
                symbols: vec![("abort", 0x234)],
            }))
        }
    }

    const TABLE: &str = "\
1000-2000 r-xp 00000000 00:00 0  /lib/x.so
2000-3000 rw-p 00000000 00:00 0  [anon:abort message]
3000-4000 rw-p 00000000 00:00 0
7000-8000 r--p 00001000 08:01 77 /lib/y.so
8000-a000 r-xp 00002000 08:01 77 /lib/y.so
";

    fn registry() -> MapRegistry {
        MapRegistry::from_reader(Pid(7), TABLE.as_bytes())
            .unwrap()
            .with_loader(Box::new(FirstSegmentLoader))
    }

    #[test]
    fn test_find_containing() {
        let registry = registry();

        assert_eq!(registry.find_containing(0x1500).unwrap().start, 0x1000);
        assert_eq!(registry.find_containing(0x2000).unwrap().start, 0x2000);
        assert_eq!(registry.find_containing(0x3fff).unwrap().start, 0x3000);
        assert!(registry.find_containing(0x4000).is_none());
        assert!(registry.find_containing(0x0).is_none());
    }

    #[test]
    fn test_previous() {
        let registry = registry();
        let regions = registry.regions();

        assert!(registry.previous(&regions[0]).is_none());
        assert_eq!(registry.previous(&regions[2]).unwrap().start, 0x2000);
        assert_eq!(registry.previous(&regions[4]).unwrap().start, 0x7000);
    }

    #[test]
    fn test_previous_of_foreign_region() {
        let registry = registry();
        let foreign = Region::new(0x2000, 0x3000, 0, "rw-p", "").unwrap();
        assert!(registry.previous(&foreign).is_none());
    }

    #[test]
    fn test_resolve_symbol() {
        let registry = registry();

        assert_eq!(registry.resolve_symbol("/lib/x.so", "abort"), Some(0x1234));
        assert!(registry.resolve_symbol("/lib/x.so", "missing").is_none());
        assert!(registry.resolve_symbol("/lib/z.so", "abort").is_none());
    }

    #[test]
    fn test_resolve_symbol_only_tries_first_match() {
        let registry = registry();
        // First /lib/y.so region has offset 0x1000, so the loader refuses it
        // and the second segment is never consulted.
        assert!(registry.resolve_symbol("/lib/y.so", "abort").is_none());
        assert!(registry.regions()[4].loaded_module().is_none());
    }

    #[test]
    fn test_locate_pc_with_symbol() {
        let registry = registry();
        let frame = registry.locate_pc(0x1240).unwrap();

        assert_eq!(frame.region.start, 0x1000);
        assert_eq!(frame.rel_pc, 0x240);
        assert_eq!(frame.symbol, Some(("abort".to_string(), 0xc)));
        assert_eq!(frame.format(0), "#00 pc 0000000000000240  /lib/x.so (abort+0xc)");
    }

    #[test]
    fn test_locate_pc_anonymous() {
        let registry = registry();
        let frame = registry.locate_pc(0x3010).unwrap();

        assert_eq!(frame.rel_pc, 0x10);
        assert!(frame.symbol.is_none());
        assert_eq!(frame.format(3), "#03 pc 0000000000000010  <anonymous>");
    }

    #[test]
    fn test_locate_pc_extreme_offset_wraps() {
        let table = "1000-2000 rw-p ffffffffffffffff 00:00 0\n";
        let registry = MapRegistry::from_reader(Pid(7), table.as_bytes()).unwrap();
        let frame = registry.locate_pc(0x1800).unwrap();

        assert_eq!(frame.rel_pc, 0x7ff);
        assert!(frame.symbol.is_none());
    }
}
