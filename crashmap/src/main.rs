//! # crashmap - Main Entry Point
//!
//! Builds the memory map of a stopped process and runs the requested
//! actions: report, abort-message scan, symbol and pc lookups, coredump
//! program headers, and JSON export.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::fs::File;
use std::io::{self, BufWriter, Write};

use crashmap::cli::Args;
use crashmap::coredump::{default_data_offset, write_program_headers};
use crashmap::domain::{DumpMode, MapsError, Pid};
use crashmap::export::MapSnapshot;
use crashmap::maps::MapRegistry;
use crashmap::preflight::{check_maps_access, check_process_exists, memory_access_warning};
use crashmap::remote_memory::ProcessMemory;
use crashmap::report::write_report;
use crashmap::symbolization::NoModules;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let permission_denied = err.chain().any(|cause| {
        let io_denied = cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::PermissionDenied);
        io_denied
            || matches!(
                cause.downcast_ref::<MapsError>(),
                Some(MapsError::SystemFailure { source, .. })
                    if source.kind() == io::ErrorKind::PermissionDenied
            )
    });

    if permission_denied || err.to_string().to_lowercase().contains("permission denied") {
        EXIT_NOPERM
    } else if matches!(err.downcast_ref::<MapsError>(), Some(MapsError::InvalidRegion { .. })) {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn load_registry(args: &Args, pid: Pid) -> Result<MapRegistry> {
    let registry = if let Some(ref path) = args.maps {
        MapRegistry::from_path(pid, path)?
    } else {
        check_process_exists(pid)?;
        check_maps_access(pid)?;
        MapRegistry::new(pid)?
    };
    if args.no_modules {
        return Ok(registry.with_loader(Box::new(NoModules)));
    }
    Ok(registry)
}

fn run() -> Result<()> {
    let args = Args::parse();
    let pid = Pid::from(args.pid);
    let quiet = args.quiet;
    let mode = DumpMode::from_java_flag(args.java);

    let registry = load_registry(&args, pid)?;
    if !quiet {
        println!("crashmap v{}", env!("CARGO_PKG_VERSION"));
        println!("pid: {}", pid.0);
        println!("regions: {}", registry.len());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();

    for query in &args.symbol {
        match registry.resolve_symbol(&query.path, &query.symbol) {
            Some(addr) => writeln!(out, "{}:{} = 0x{addr:x}", query.path, query.symbol)?,
            None => writeln!(out, "{}:{} not found", query.path, query.symbol)?,
        }
    }

    for (idx, &pc) in args.pc.iter().enumerate() {
        match registry.locate_pc(pc) {
            Some(frame) => {
                writeln!(out, "{}", frame.format(idx))?;
                if let Some(prev) = registry.previous(frame.region) {
                    writeln!(
                        out,
                        "    below: {:x}-{:x} {} {}",
                        prev.start,
                        prev.end,
                        prev.prot,
                        prev.name().unwrap_or("")
                    )?;
                }
            }
            None => writeln!(out, "#{idx:02} pc {pc:016x}  <unmapped>")?,
        }
    }

    if args.abort_msg {
        if let Some(warning) = memory_access_warning() {
            warn!("{warning}");
        }
        let mut mem = ProcessMemory::new(pid);
        match registry.find_abort_message(&mut mem) {
            Some(addr) => writeln!(out, "abort message: 0x{addr:x}")?,
            None => writeln!(out, "abort message: not found")?,
        }
    }

    if args.report || args.wants_default_report() {
        write_report(&registry, &mut out).context("Failed to write memory map report")?;
    }

    if let Some(ref path) = args.coredump {
        // Unbuffered: every header must land in a single write
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let data_offset = args.data_offset.unwrap_or_else(|| default_data_offset(registry.len()));

        let summary = write_program_headers(&registry, &mut file, data_offset, mode)
            .with_context(|| format!("Failed to write program headers to {}", path.display()))?;

        info!(
            "Wrote {} program headers ({} mode), {} KB of segment contents",
            summary.headers,
            mode,
            summary.content_size / 1024
        );
        if !quiet {
            println!(
                "coredump: {} headers, content 0x{:x} bytes, next offset 0x{:x}",
                summary.headers, summary.content_size, summary.next_offset
            );
        }
    }

    if let Some(ref path) = args.export {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        MapSnapshot::capture(&registry, mode).export(BufWriter::new(file))?;
        if !quiet {
            println!("export: {}", path.display());
        }
    }

    Ok(())
}
