//! Reading memory of a stopped process
//!
//! Used by the abort-message scan. A read either fills the whole buffer or
//! fails; there is no retry.

#![allow(unsafe_code)] // process_vm_readv and ptrace require unsafe

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

use log::debug;

#[cfg(target_os = "android")]
use libc::__errno as errno_location;
#[cfg(not(target_os = "android"))]
use libc::__errno_location as errno_location;

use crate::domain::Pid;

/// Source of bytes from the inspected process
pub trait RemoteMemory {
    /// Fill `buf` from `addr` in the target, or fail without partial success
    ///
    /// # Errors
    /// Returns an error if any byte of the range cannot be read.
    fn read_fully(&mut self, addr: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Read one native-endian `u64` at `addr`
    ///
    /// # Errors
    /// Same as [`RemoteMemory::read_fully`].
    fn read_u64(&mut self, addr: u64) -> io::Result<u64> {
        let mut bytes = [0u8; 8];
        self.read_fully(addr, &mut bytes)?;
        Ok(u64::from_ne_bytes(bytes))
    }
}

enum Style {
    /// [`process_vm_readv`](https://man7.org/linux/man-pages/man2/process_vm_readv.2.html),
    /// needs the same permissions as ptrace
    VirtualMem,
    /// `/proc/<pid>/mem`, for kernels or sandboxes without `process_vm_readv`
    File(File),
    /// `PTRACE_PEEKDATA`, one word at a time; only works once the caller has
    /// attached to the target
    Ptrace,
}

/// Reads the target's memory, picking the access method on first use
pub struct ProcessMemory {
    pid: Pid,
    style: Option<Style>,
}

impl std::fmt::Debug for ProcessMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let style = match &self.style {
            Some(Style::VirtualMem) => "process_vm_readv",
            Some(Style::File(_)) => "/proc/<pid>/mem",
            Some(Style::Ptrace) => "PTRACE_PEEKDATA",
            None => "unknown",
        };
        write!(f, "ProcessMemory({}, {style})", self.pid)
    }
}

impl ProcessMemory {
    #[must_use]
    pub fn new(pid: Pid) -> Self {
        Self { pid, style: None }
    }

    fn vm_readv(&self, addr: u64, buf: &mut [u8]) -> io::Result<()> {
        let local = libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        };
        let remote = libc::iovec {
            iov_base: addr as usize as *mut libc::c_void,
            iov_len: buf.len(),
        };

        // SAFETY: local points at `buf`, which is valid for writes of its length
        let read = unsafe { libc::process_vm_readv(self.pid.0, &local, 1, &remote, 1, 0) };
        match usize::try_from(read) {
            Ok(n) if n == buf.len() => Ok(()),
            Ok(n) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("partial read of {n}/{} bytes at 0x{addr:x}", buf.len()),
            )),
            Err(_) => Err(io::Error::last_os_error()),
        }
    }

    fn read_mem_file(&self, addr: u64, buf: &mut [u8]) -> io::Result<File> {
        let file = File::open(format!("/proc/{}/mem", self.pid.0))?;
        file.read_exact_at(buf, addr)?;
        Ok(file)
    }

    /// One `PTRACE_PEEKDATA` word at `addr`
    fn peek_word(&self, addr: u64) -> io::Result<libc::c_long> {
        // A word of all ones is valid data, so errno has to be cleared first
        // SAFETY: errno is thread-local; PEEKDATA does not write through its
        // pointer arguments
        let word = unsafe {
            *errno_location() = 0;
            libc::ptrace(
                libc::PTRACE_PEEKDATA,
                self.pid.0,
                addr as usize as *mut libc::c_void,
                std::ptr::null_mut::<libc::c_void>(),
            )
        };
        if word != -1 {
            return Ok(word);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(0) | None => Ok(word),
            Some(_) => Err(err),
        }
    }

    fn peek(&self, addr: u64, buf: &mut [u8]) -> io::Result<()> {
        const WORD: usize = std::mem::size_of::<libc::c_long>();

        let mut chunks = buf.chunks_exact_mut(WORD);
        let mut cursor = addr;
        for chunk in chunks.by_ref() {
            chunk.copy_from_slice(&self.peek_word(cursor)?.to_ne_bytes());
            cursor = cursor.wrapping_add(WORD as u64);
        }

        let tail = chunks.into_remainder();
        if !tail.is_empty() {
            let word = self.peek_word(cursor)?.to_ne_bytes();
            tail.copy_from_slice(&word[..tail.len()]);
        }
        Ok(())
    }
}

impl RemoteMemory for ProcessMemory {
    fn read_fully(&mut self, addr: u64, buf: &mut [u8]) -> io::Result<()> {
        if buf.is_empty() {
            return Ok(());
        }

        match &self.style {
            Some(Style::VirtualMem) => return self.vm_readv(addr, buf),
            Some(Style::File(file)) => return file.read_exact_at(buf, addr),
            Some(Style::Ptrace) => return self.peek(addr, buf),
            None => {}
        }

        // Try each method in order of speed and keep whichever works first
        let vmem_err = match self.vm_readv(addr, buf) {
            Ok(()) => {
                self.style = Some(Style::VirtualMem);
                return Ok(());
            }
            Err(e) => e,
        };
        // An unmapped address fails with EFAULT under every method
        if vmem_err.raw_os_error() == Some(libc::EFAULT) {
            return Err(vmem_err);
        }

        match self.read_mem_file(addr, buf) {
            Ok(file) => {
                self.style = Some(Style::File(file));
                return Ok(());
            }
            Err(e) => debug!("/proc/{}/mem read at 0x{addr:x} failed: {e}", self.pid.0),
        }

        self.peek(addr, buf)?;
        self.style = Some(Style::Ptrace);
        Ok(())
    }
}
