//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use xcov::TraceFormat;

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code after an internal fault.
pub const EXIT_FAULT: i32 = 2;
/// Exit code after SIGINT/SIGTERM.
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "xcov")]
#[command(about = "Instruction and branch coverage for cross-compiled embedded binaries")]
#[command(version)]
pub struct Cli {
    /// Show metrics summary after execution
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Merge traces into per-symbol coverage and report what never ran
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Target triple, e.g. sparc-rtems6 (selects <target>-objdump)
    #[arg(short = 'T', long)]
    pub target: String,

    /// File listing the symbols to analyze, one per line
    #[arg(short = 's', long, value_name = "FILE")]
    pub symbols: PathBuf,

    /// Trace file format
    #[arg(short = 'f', long, value_enum, default_value = "spike")]
    pub format: TraceFormatArg,

    /// Single executable followed by its traces
    #[arg(short = '1', long = "single", value_name = "EXE", conflicts_with_all = ["executable_ext", "trace_ext"])]
    pub single: Option<PathBuf>,

    /// Extension stripped from each executable to find its trace
    #[arg(short = 'e', long = "executable-extension", value_name = "EXT", requires = "trace_ext")]
    pub executable_ext: Option<String>,

    /// Extension appended to find each executable's trace
    #[arg(short = 'c', long = "trace-extension", value_name = "EXT", requires = "executable_ext")]
    pub trace_ext: Option<String>,

    /// Analyze this dynamic library, resolved through <exe>.dlinfo
    #[arg(short = 'L', long, value_name = "NAME")]
    pub library: Option<String>,

    /// Read <exe>.<EXT> listings instead of running objdump
    #[arg(long = "dump-ext", value_name = "EXT")]
    pub dump_extension: Option<String>,

    /// Number of worker threads (0 = auto)
    #[arg(short = 'j', long, default_value = "0")]
    pub jobs: usize,

    /// Keep disassembler output files
    #[arg(long)]
    pub keep_temps: bool,

    /// Print per-symbol statistics
    #[arg(long = "symbols-table")]
    pub symbols_table: bool,

    /// Executables, or with --single the trace files
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

/// Trace file format.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum TraceFormatArg {
    /// Spike commit log
    Spike,
    /// One hexadecimal program counter per line
    Pcs,
}

impl From<TraceFormatArg> for TraceFormat {
    fn from(arg: TraceFormatArg) -> Self {
        match arg {
            TraceFormatArg::Spike => Self::Spike,
            TraceFormatArg::Pcs => Self::Pcs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_mode() {
        let cli = Cli::try_parse_from([
            "xcov", "analyze", "-T", "sparc-rtems6", "-s", "syms.txt", "-f", "pcs", "-1",
            "hello.exe", "run1.pcs", "run2.pcs",
        ])
        .unwrap();
        let Commands::Analyze(args) = cli.command;
        assert_eq!(args.single, Some(PathBuf::from("hello.exe")));
        assert_eq!(args.files.len(), 2);
        assert!(matches!(args.format, TraceFormatArg::Pcs));
    }

    #[test]
    fn test_parse_extension_mode() {
        let cli = Cli::try_parse_from([
            "xcov", "analyze", "-T", "riscv-rtems6", "-s", "syms.txt", "-e", "exe", "-c",
            "cov", "a.exe", "b.exe", "--silent",
        ])
        .unwrap();
        assert!(cli.silent);
        let Commands::Analyze(args) = cli.command;
        assert_eq!(args.executable_ext.as_deref(), Some("exe"));
        assert_eq!(args.trace_ext.as_deref(), Some("cov"));
        assert_eq!(args.files.len(), 2);
    }

    #[test]
    fn test_extension_flags_require_each_other() {
        let result = Cli::try_parse_from([
            "xcov", "analyze", "-T", "riscv-rtems6", "-s", "syms.txt", "-e", "exe", "a.exe",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_single_conflicts_with_extensions() {
        let result = Cli::try_parse_from([
            "xcov", "analyze", "-T", "riscv-rtems6", "-s", "syms.txt", "-1", "a.exe", "-e",
            "exe", "-c", "cov",
        ]);
        assert!(result.is_err());
    }
}
