//! The capture flow on a small, fixed mapping table

use std::collections::HashMap;
use std::io;

use crashmap::abort_message::{ABORT_MSG_MAGIC_1, ABORT_MSG_MAGIC_2};
use crashmap::coredump::{dump_size, program_headers, write_program_headers, PHDR_SIZE};
use crashmap::remote_memory::RemoteMemory;
use crashmap::report::render_report;
use crashmap::{DumpMode, MapRegistry, Pid};

const TABLE: &str = "\
1000-2000 r-xp 00000000 00:00 0  /lib/x.so
2000-3000 rw-p 00000000 00:00 0  [anon:abort message]
3000-4000 rw-p 00000000 00:00 0
";

/// Serves the two magic words at one address, fails everywhere else
struct SignatureMemory {
    words: HashMap<u64, u64>,
}

impl SignatureMemory {
    fn at(addr: u64) -> Self {
        let mut words = HashMap::new();
        words.insert(addr, ABORT_MSG_MAGIC_1);
        words.insert(addr + 8, ABORT_MSG_MAGIC_2);
        Self { words }
    }
}

impl RemoteMemory for SignatureMemory {
    fn read_fully(&mut self, addr: u64, buf: &mut [u8]) -> io::Result<()> {
        let word = self
            .words
            .get(&addr)
            .ok_or_else(|| io::Error::other("unmapped"))?;
        buf.copy_from_slice(&word.to_ne_bytes()[..buf.len()]);
        Ok(())
    }
}

fn registry() -> MapRegistry {
    MapRegistry::from_reader(Pid(4242), TABLE.as_bytes()).expect("table should parse")
}

#[test]
fn test_abort_message_found() {
    let registry = registry();
    let mut mem = SignatureMemory::at(0x2000);
    assert_eq!(registry.find_abort_message(&mut mem), Some(0x2000));
}

#[test]
fn test_lookups() {
    let registry = registry();
    let regions = registry.regions();

    let hit = registry.find_containing(0x1500).expect("0x1500 is mapped");
    assert!(std::ptr::eq(hit, &regions[0]));

    let prev = registry.previous(&regions[2]).expect("third region has a predecessor");
    assert!(std::ptr::eq(prev, &regions[1]));
    assert!(registry.previous(&regions[0]).is_none());
}

#[test]
fn test_native_coredump_policy() {
    let registry = registry();
    let regions = registry.regions();

    assert_eq!(dump_size(&regions[0], DumpMode::Native), 0);
    assert_eq!(dump_size(&regions[2], DumpMode::Native), 0x1000);

    let segments = program_headers(&registry, 0x1000, DumpMode::Native).unwrap();
    assert_eq!(segments.len(), 3);
    assert!(segments.iter().all(|s| s.filesz <= s.memsz));
}

#[test]
fn test_full_capture_outputs() {
    let registry = registry();

    let report = render_report(&registry);
    assert!(report.starts_with("memory map:\n"));
    assert_eq!(report.lines().count(), 6);

    let mut core = Vec::new();
    let summary =
        write_program_headers(&registry, &mut core, 0x200, DumpMode::JavaAware).unwrap();
    assert_eq!(summary.headers, 3);
    assert!(core.len() > 3 * PHDR_SIZE);
}
