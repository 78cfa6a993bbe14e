//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(
    name = "crashmap",
    about = "Inspect a crashed process's memory map and write minimal core program headers",
    after_help = "\
EXAMPLES:
    crashmap --pid 1234                                Print the memory map report
    crashmap --pid 1234 --abort-msg                    Locate the abort message buffer
    crashmap --pid 1234 --symbol /system/lib64/libc.so:abort
    crashmap --pid 1234 --pc 7f3a2b4c780 --pc 7f3a2b4d120
    crashmap --pid 1234 --coredump core.phdrs --java   Keep managed-runtime regions"
)]
pub struct Args {
    /// Process ID of the crashed (stopped) process
    #[arg(short, long)]
    pub pid: i32,

    /// Read a saved mapping table instead of /proc/<pid>/maps
    #[arg(long, value_name = "FILE")]
    pub maps: Option<PathBuf>,

    /// Print the memory map report (default when no other action is given)
    #[arg(short, long)]
    pub report: bool,

    /// Locate the abort message buffer by its signature
    #[arg(long)]
    pub abort_msg: bool,

    /// Resolve a symbol's runtime address (repeatable)
    #[arg(long, value_name = "PATH:SYMBOL")]
    pub symbol: Vec<SymbolQuery>,

    /// Describe the mapping containing a hex address (repeatable)
    #[arg(long, value_name = "ADDR", value_parser = parse_hex)]
    pub pc: Vec<u64>,

    /// Write PT_LOAD program headers for a minimal core file
    #[arg(long, value_name = "FILE")]
    pub coredump: Option<PathBuf>,

    /// Keep managed-runtime artifacts needed for Java stacks
    #[arg(long)]
    pub java: bool,

    /// File offset of the first segment's contents (decimal or 0x-hex)
    #[arg(long, value_name = "N", value_parser = parse_number)]
    pub data_offset: Option<u64>,

    /// Never open module files; symbol lookups miss and load biases are omitted
    #[arg(long)]
    pub no_modules: bool,

    /// Export a JSON snapshot of the memory map
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// True when no action flag was given, so the report is printed
    #[must_use]
    pub fn wants_default_report(&self) -> bool {
        !self.abort_msg
            && self.symbol.is_empty()
            && self.pc.is_empty()
            && self.coredump.is_none()
            && self.export.is_none()
    }
}

/// `--symbol` value: a mapped path and a symbol inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolQuery {
    pub path: String,
    pub symbol: String,
}

impl FromStr for SymbolQuery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once(':') {
            Some((path, symbol)) if !path.is_empty() && !symbol.is_empty() => {
                Ok(Self {
                    path: path.to_string(),
                    symbol: symbol.to_string(),
                })
            }
            _ => Err(format!("expected PATH:SYMBOL, got {s:?}")),
        }
    }
}

fn parse_hex(s: &str) -> Result<u64, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid hex address {s:?}: {e}"))
}

fn parse_number(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number {s:?}: {e}"))
}
