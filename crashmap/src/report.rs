//! Human-readable memory map report
//!
//! Output looks like:
//!
//! ```text
//! memory map:
//!     0000000000001000-0000000000002000 r-x    0 1000 /lib/x.so
//!     0000000000002000-0000000000003000 rw- 1000 1000 >
//!     0000000000003000-0000000000004000 rw-    0 1000
//!     TOTAL SIZE: 0xcK (12K)
//! ```
//!
//! A name identical to the previous line's is shortened to `>` unless the
//! line carries a load-bias annotation.

use std::io::Write;

use crate::domain::Result;
use crate::maps::MapRegistry;

/// Number of hex digits needed for `value`, at least one
fn hex_width(value: u64) -> usize {
    let mut width = 0;
    let mut rest = value;
    while rest != 0 {
        rest /= 0x10;
        width += 1;
    }
    width.max(1)
}

/// Write the memory map table and total size line to `out`
///
/// # Errors
/// Returns the first write error; nothing is retried.
pub fn write_report<W: Write + ?Sized>(registry: &MapRegistry, out: &mut W) -> Result<()> {
    let (max_size, max_offset) = registry.iter().fold((0u64, 0u64), |(size, offset), region| {
        (size.max(region.size()), offset.max(region.offset))
    });
    let width_size = hex_width(max_size);
    let width_offset = hex_width(max_offset);

    out.write_all(b"memory map:\n")?;

    let mut prev_name: Option<&str> = None;
    for region in registry {
        let load_bias = region
            .load_bias()
            .map(|bias| format!(" (load bias 0x{bias:x})"))
            .unwrap_or_default();

        let name = match region.name() {
            Some(name) if load_bias.is_empty() && prev_name == Some(name) => ">",
            Some(name) => name,
            None => "",
        };
        prev_name = region.name();

        writeln!(
            out,
            "    {:016x}-{:016x} {} {:>width_offset$x} {:>width_size$x} {name}{load_bias}",
            region.start,
            region.end,
            region.prot,
            region.offset,
            region.size(),
        )?;
    }

    let total_kb = registry.total_size() / 1024;
    write!(out, "    TOTAL SIZE: 0x{total_kb:x}K ({total_kb}K)\n\n")?;

    Ok(())
}

/// Render the report into a string
#[must_use]
pub fn render_report(registry: &MapRegistry) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail
    let _ = write_report(registry, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MapsError, Pid};
    use crate::symbolization::ModuleImage;
    use std::io;

    struct Biased(u64);

    impl ModuleImage for Biased {
        fn symbol_address(&self, _name: &str) -> Option<u64> {
            None
        }

        fn load_bias(&self) -> u64 {
            self.0
        }
    }

    const SHARED_NAME: &str = "\
1000-2000 r--p 00000000 08:01 7  /lib/x.so
2000-4000 r-xp 00001000 08:01 7  /lib/x.so
";

    fn registry(table: &str) -> MapRegistry {
        MapRegistry::from_reader(Pid(1), table.as_bytes()).unwrap()
    }

    #[test]
    fn test_hex_width() {
        assert_eq!(hex_width(0), 1);
        assert_eq!(hex_width(0xf), 1);
        assert_eq!(hex_width(0x10), 2);
        assert_eq!(hex_width(0x2000), 4);
    }

    #[test]
    fn test_repeated_name_compressed() {
        let report = render_report(&registry(SHARED_NAME));
        let lines: Vec<&str> = report.lines().collect();

        assert_eq!(lines[0], "memory map:");
        assert_eq!(lines[1], "    0000000000001000-0000000000002000 r--    0 1000 /lib/x.so");
        assert_eq!(lines[2], "    0000000000002000-0000000000004000 r-x 1000 2000 >");
        assert_eq!(lines[3], "    TOTAL SIZE: 0xcK (12K)");
    }

    #[test]
    fn test_load_bias_forces_full_name() {
        let registry = registry(SHARED_NAME);
        assert!(registry.regions()[1].attach_module(Box::new(Biased(0x1000))));

        let report = render_report(&registry);
        let lines: Vec<&str> = report.lines().collect();

        assert_eq!(
            lines[2],
            "    0000000000002000-0000000000004000 r-x 1000 2000 /lib/x.so (load bias 0x1000)"
        );
    }

    #[test]
    fn test_zero_load_bias_keeps_compression() {
        let registry = registry(SHARED_NAME);
        assert!(registry.regions()[1].attach_module(Box::new(Biased(0))));

        let report = render_report(&registry);
        assert!(report.lines().nth(2).unwrap().ends_with(" >"));
    }

    #[test]
    fn test_unnamed_region_breaks_run() {
        let report = render_report(&registry(
            "1000-2000 rw-p 00000000 00:00 0 [anon:a]\n\
             2000-3000 rw-p 00000000 00:00 0\n\
             3000-4000 rw-p 00000000 00:00 0 [anon:a]\n",
        ));
        let lines: Vec<&str> = report.lines().collect();

        assert!(lines[2].ends_with("1000 "));
        assert!(lines[3].ends_with("[anon:a]"));
    }

    #[test]
    fn test_empty_registry() {
        let report = render_report(&registry("not a maps line\n"));
        assert_eq!(report, "memory map:\n    TOTAL SIZE: 0x0K (0K)\n\n");
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_short_write_surfaces() {
        let err = write_report(&registry(SHARED_NAME), &mut FailingSink).unwrap_err();
        assert!(matches!(err, MapsError::Io(ref e) if e.kind() == io::ErrorKind::WriteZero));
    }
}
