//! xcov - instruction and branch coverage for cross-compiled binaries
//!
//! Disassembles each executable with the target's objdump, marks the
//! instructions a simulator trace executed, merges the per-executable maps
//! into one map per requested symbol and reports what never ran.
//!
//! # Example
//!
//! ```ignore
//! use xcov::{ExecutableInput, SessionConfig, TraceFormat};
//!
//! let config = SessionConfig::new("riscv-rtems6", "symbols.txt")
//!     .with_input(ExecutableInput::new("hello.exe", vec!["hello.pcs".into()]))
//!     .with_trace_format(TraceFormat::Pcs);
//! let report = xcov::analyze(config)?;
//! println!("{} uncovered ranges", report.totals.stats.uncovered_ranges);
//! ```

pub use xcov_coverage::{
    Address, BranchClass, CoverageError, CoverageMap, ExecutableContext, ExecutableId,
    RangeKind, Statistics, SymbolInfo, SymbolRegistry, Totals, UncoveredRange,
};
pub use xcov_objdump::{LoadMap, ObjdumpError, ObjdumpParser};
pub use xcov_target::{TargetError, TargetInfo, target_for};

mod error;
pub use error::{Error, Result};

pub mod disasm;
pub mod metrics;
pub mod session;
pub mod temp;
pub mod trace;

pub use disasm::{DisassemblySource, DumpFile, ObjdumpCommand};
pub use session::{AnalysisReport, AnalysisSession, ExecutableInput, ExecutableSummary, SessionConfig};
pub use temp::TempFiles;
pub use trace::{TraceFormat, TraceReader, TraceSummary};

/// Run a complete analysis with default collaborators.
pub fn analyze(config: SessionConfig) -> Result<AnalysisReport> {
    AnalysisSession::new(config)?.run()
}
