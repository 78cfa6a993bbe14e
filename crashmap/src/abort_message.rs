//! Locating the abort-message buffer
//!
//! Android's libc stashes the `abort()` message in an anonymous mapping
//! labelled `[anon:abort message]`, beginning with two magic words. The
//! scan is forensic and best-effort: a candidate that cannot be read is
//! skipped and the next one is tried.

use log::debug;

use crate::maps::{MapRegistry, Protection};
use crate::remote_memory::RemoteMemory;

/// Label the kernel shows for the abort-message mapping
pub const ABORT_MSG_NAME: &str = "[anon:abort message]";
pub const ABORT_MSG_MAGIC_1: u64 = 0xb18e_4088_6ac3_88f0;
pub const ABORT_MSG_MAGIC_2: u64 = 0xc6df_ba75_5a1d_e0b5;

impl MapRegistry {
    /// Start address of the abort-message buffer, if any candidate carries
    /// both magic words
    ///
    /// Candidates are regions named [`ABORT_MSG_NAME`] whose access bits are
    /// exactly read+write.
    pub fn find_abort_message(&self, mem: &mut dyn RemoteMemory) -> Option<u64> {
        let wanted = Protection::READ | Protection::WRITE;

        for region in self.iter() {
            if !region.has_name(ABORT_MSG_NAME) || region.prot.access() != wanted {
                continue;
            }

            let magic = match mem.read_u64(region.start) {
                Ok(magic) => magic,
                Err(e) => {
                    debug!("Skipping abort-message candidate 0x{:x}: {e}", region.start);
                    continue;
                }
            };
            if magic != ABORT_MSG_MAGIC_1 {
                continue;
            }

            let start = region.start;
            let Some(second) = start.checked_add(8) else {
                debug!("Skipping abort-message candidate 0x{start:x}: too close to the top");
                continue;
            };
            let magic = match mem.read_u64(second) {
                Ok(magic) => magic,
                Err(e) => {
                    debug!("Skipping abort-message candidate 0x{:x}: {e}", region.start);
                    continue;
                }
            };
            if magic != ABORT_MSG_MAGIC_2 {
                continue;
            }

            return Some(region.start);
        }

        None
    }
}
