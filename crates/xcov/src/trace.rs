//! Execution trace readers.
//!
//! A reader turns one trace file into executed bits in an
//! [`ExecutableContext`]'s coverage maps. When consecutive program counters
//! are available, the direction taken at each conditional branch is
//! recorded too.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use xcov_coverage::{Address, ExecutableContext};

use crate::{Error, Result};

/// Supported trace file formats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TraceFormat {
    /// Spike commit log: `core   0: 3 0x<pc> (0x<opcode>) ...`
    #[default]
    Spike,
    /// One hexadecimal program counter per line.
    Pcs,
}

impl FromStr for TraceFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spike" => Ok(Self::Spike),
            "pcs" | "pc" => Ok(Self::Pcs),
            other => Err(format!("unknown trace format '{other}'")),
        }
    }
}

/// What applying one trace did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraceSummary {
    /// Program counters read from the trace.
    pub entries: u64,
    /// Entries that fell inside an analyzed symbol.
    pub matched: u64,
}

pub trait TraceReader: Send + Sync {
    fn apply(&self, path: &Path, ctx: &mut ExecutableContext) -> Result<TraceSummary>;
}

#[must_use]
pub fn reader_for(format: TraceFormat) -> Box<dyn TraceReader> {
    match format {
        TraceFormat::Spike => Box::new(SpikeTrace),
        TraceFormat::Pcs => Box::new(PcTrace),
    }
}

/// Open a trace, decompressing `.zst` files on the fly.
pub fn open_trace(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|source| Error::OpenInput {
        path: path.to_path_buf(),
        source,
    })?;
    if path.extension().is_some_and(|ext| ext == "zst") {
        let decoder = zstd::stream::read::Decoder::new(file)?;
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Follows consecutive program counters and records branch directions.
#[derive(Default)]
struct Walker {
    previous: Option<(Address, Option<Address>)>,
    summary: TraceSummary,
}

impl Walker {
    /// Visit `pc`; `fallthrough` is the address after it when known.
    fn step(&mut self, ctx: &mut ExecutableContext, pc: Address, fallthrough: Option<Address>) {
        self.summary.entries += 1;
        if let Some((prev, prev_fallthrough)) = self.previous {
            record_direction(ctx, prev, prev_fallthrough, pc);
        }
        if ctx.mark_executed(pc) {
            self.summary.matched += 1;
        }
        self.previous = Some((pc, fallthrough));
    }
}

/// Record which way the branch at `branch` went, judging by the next traced
/// PC. Only the fall-through and the static target count; any other next PC
/// is a trap or interrupt entry and says nothing about the branch.
fn record_direction(
    ctx: &mut ExecutableContext,
    branch: Address,
    fallthrough: Option<Address>,
    next: Address,
) {
    let Some(map) = ctx.coverage_map_at(branch) else {
        return;
    };
    if !map.is_branch(branch) {
        return;
    }
    let fallthrough = fallthrough.or_else(|| map.next_instruction_start(branch));
    if fallthrough == Some(next) {
        ctx.mark_branch_direction(branch, false);
    } else if ctx.branch_target(branch) == Some(next) {
        ctx.mark_branch_direction(branch, true);
    }
}

/// Spike `--log-commits` / `-l` output.
pub struct SpikeTrace;

static SPIKE_PC: OnceLock<Regex> = OnceLock::new();

impl SpikeTrace {
    /// Program counter and opcode of one commit line.
    #[must_use]
    pub fn parse_line(line: &str) -> Option<(Address, u32)> {
        let line = line.trim();
        if !line.starts_with("core") {
            return None;
        }
        let caps = SPIKE_PC
            .get_or_init(|| Regex::new(r"0x([0-9a-fA-F]+)\s+\(0x([0-9a-fA-F]+)\)").unwrap())
            .captures(line)?;
        let pc = u64::from_str_radix(caps.get(1)?.as_str(), 16).ok()?;
        let opcode = u32::from_str_radix(caps.get(2)?.as_str(), 16).ok()?;
        // RV32 addresses are logged sign-extended to 64 bits.
        let pc = Address::try_from(pc & u64::from(Address::MAX)).ok()?;
        Some((pc, opcode))
    }

    /// RISC-V instruction length from the low opcode bits.
    #[must_use]
    pub const fn instruction_size(opcode: u32) -> u32 {
        if opcode & 0b11 == 0b11 { 4 } else { 2 }
    }
}

impl TraceReader for SpikeTrace {
    fn apply(&self, path: &Path, ctx: &mut ExecutableContext) -> Result<TraceSummary> {
        let mut walker = Walker::default();
        for line in open_trace(path)?.lines() {
            let line = line?;
            if let Some((pc, opcode)) = Self::parse_line(&line) {
                let fallthrough = pc.checked_add(Self::instruction_size(opcode));
                walker.step(ctx, pc, fallthrough);
            }
        }
        debug!(
            trace = %path.display(),
            entries = walker.summary.entries,
            matched = walker.summary.matched,
            "applied spike trace"
        );
        Ok(walker.summary)
    }
}

/// Plain program-counter list.
pub struct PcTrace;

impl PcTrace {
    #[must_use]
    pub fn parse_line(line: &str) -> Option<Address> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let hex = line
            .split_whitespace()
            .next()?
            .trim_start_matches("0x")
            .trim_start_matches("0X");
        Address::from_str_radix(hex, 16).ok()
    }
}

impl TraceReader for PcTrace {
    fn apply(&self, path: &Path, ctx: &mut ExecutableContext) -> Result<TraceSummary> {
        let mut walker = Walker::default();
        for line in open_trace(path)?.lines() {
            let line = line?;
            if let Some(pc) = Self::parse_line(&line) {
                walker.step(ctx, pc, None);
            }
        }
        debug!(
            trace = %path.display(),
            entries = walker.summary.entries,
            matched = walker.summary.matched,
            "applied pc trace"
        );
        Ok(walker.summary)
    }
}
