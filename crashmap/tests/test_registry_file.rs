//! Building registries from saved mapping tables on disk

use std::io::Write;

use crashmap::maps::Protection;
use crashmap::{MapRegistry, MapsError, Pid};
use tempfile::NamedTempFile;

fn write_table(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write table");
    file
}

#[test]
fn test_realistic_android_table() {
    let table = write_table(
        "\
12c00000-32c00000 rw-p 00000000 00:00 0                                  [anon:dalvik-main space (region space)]
6f1d2000-6f4a5000 rw-p 00000000 fd:00 1017                               /system/framework/arm64/boot.art
7b8a1c0000-7b8a1e3000 r--p 00000000 07:30 39                             /apex/com.android.runtime/lib64/bionic/libc.so
7b8a1e3000-7b8a25d000 r-xp 00023000 07:30 39                             /apex/com.android.runtime/lib64/bionic/libc.so
7b8a25d000-7b8a262000 r--p 0009c000 07:30 39                             /apex/com.android.runtime/lib64/bionic/libc.so
7b8a262000-7b8a263000 rw-p 000a0000 07:30 39                             /apex/com.android.runtime/lib64/bionic/libc.so
7ff5a1f000-7ff5a20000 ---p 00000000 00:00 0
7ff5a20000-7ff621f000 rw-p 00000000 00:00 0                              [stack]
",
    );

    let registry = MapRegistry::from_path(Pid(1000), table.path()).unwrap();
    assert_eq!(registry.len(), 8);

    let libc_code = registry.find_containing(0x7b_8a1e_4000).unwrap();
    assert_eq!(libc_code.offset, 0x23000);
    assert!(libc_code.prot.executable());
    assert_eq!(libc_code.prot.access(), Protection::READ | Protection::EXEC);

    let last = registry.regions().last().unwrap();
    let guard = registry.previous(last).unwrap();
    assert_eq!(guard.prot.access(), Protection::NONE);
    assert_eq!(guard.name(), None);
}

#[test]
fn test_unreadable_lines_are_skipped() {
    let table = write_table(
        "\
1000-2000 r-xp 00000000 00:00 0 /lib/x.so
this is not a mapping
Rss:                   4 kB

3000-4000 rw-p 00000000 00:00 0
",
    );

    let registry = MapRegistry::from_path(Pid(1), table.path()).unwrap();
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_bad_region_aborts_build() {
    let table = write_table(
        "\
1000-2000 r-xp 00000000 00:00 0 /lib/x.so
3000-2000 rw-p 00000000 00:00 0
",
    );

    let err = MapRegistry::from_path(Pid(1), table.path()).unwrap_err();
    match err {
        MapsError::InvalidRegion { line, reason } => {
            assert_eq!(line, 2);
            assert!(reason.contains("0x3000"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
