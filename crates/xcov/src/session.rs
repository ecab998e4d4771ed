//! One coverage analysis run.

use std::path::PathBuf;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};
use xcov_coverage::{ExecutableContext, ExecutableId, SymbolRegistry, Totals};
use xcov_objdump::{LoadMap, ObjdumpParser};
use xcov_target::{TargetInfo, target_for};

use crate::disasm::{DisassemblySource, DumpFile, ObjdumpCommand};
use crate::metrics;
use crate::temp::TempFiles;
use crate::trace::{TraceFormat, TraceReader, TraceSummary, reader_for};
use crate::{Error, Result};

/// An executable and the traces recorded running it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutableInput {
    pub executable: PathBuf,
    pub traces: Vec<PathBuf>,
}

impl ExecutableInput {
    pub fn new(executable: impl Into<PathBuf>, traces: Vec<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            traces,
        }
    }

    /// Pair each executable with the trace named by swapping its extension:
    /// `hello.exe` with `exe`/`cov` pairs with `hello.cov`.
    #[must_use]
    pub fn paired(executables: &[PathBuf], executable_ext: &str, trace_ext: &str) -> Vec<Self> {
        let executable_ext = executable_ext.trim_start_matches('.');
        let trace_ext = trace_ext.trim_start_matches('.');
        executables
            .iter()
            .map(|exe| {
                let name = exe.to_string_lossy();
                let stem = name
                    .strip_suffix(executable_ext)
                    .and_then(|s| s.strip_suffix('.'))
                    .unwrap_or(name.as_ref());
                Self::new(exe.clone(), vec![PathBuf::from(format!("{stem}.{trace_ext}"))])
            })
            .collect()
    }
}

/// Everything a run needs, gathered before any processing starts.
#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    pub target: String,
    pub symbols: PathBuf,
    pub inputs: Vec<ExecutableInput>,
    pub trace_format: TraceFormat,
    /// Analyze this dynamic library instead of the executables themselves.
    pub library: Option<String>,
    /// Read `<executable>.<ext>` listings instead of running objdump.
    pub dump_extension: Option<String>,
    /// Worker threads (0 = one per CPU).
    pub jobs: usize,
    pub keep_temps: bool,
}

impl SessionConfig {
    pub fn new(target: impl Into<String>, symbols: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            symbols: symbols.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_input(mut self, input: ExecutableInput) -> Self {
        self.inputs.push(input);
        self
    }

    #[must_use]
    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = ExecutableInput>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    #[must_use]
    pub const fn with_trace_format(mut self, format: TraceFormat) -> Self {
        self.trace_format = format;
        self
    }

    #[must_use]
    pub fn with_library(mut self, library: Option<String>) -> Self {
        self.library = library;
        self
    }

    #[must_use]
    pub fn with_dump_extension(mut self, extension: Option<String>) -> Self {
        self.dump_extension = extension;
        self
    }

    #[must_use]
    pub const fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    #[must_use]
    pub const fn with_keep_temps(mut self, keep: bool) -> Self {
        self.keep_temps = keep;
        self
    }
}

/// Per-executable outcome.
#[derive(Clone, Debug)]
pub struct ExecutableSummary {
    pub id: ExecutableId,
    pub path: PathBuf,
    pub symbols: usize,
    pub traces: TraceSummary,
}

/// Final state handed to reporting.
#[derive(Debug)]
pub struct AnalysisReport {
    pub registry: SymbolRegistry,
    pub totals: Totals,
    pub executables: Vec<ExecutableSummary>,
}

/// Owns all state of one run: target capability, symbol registry,
/// executables and temporary files.
pub struct AnalysisSession {
    config: SessionConfig,
    target: Box<dyn TargetInfo>,
    registry: SymbolRegistry,
    temps: TempFiles,
    disassembler: Box<dyn DisassemblySource>,
    traces: Box<dyn TraceReader>,
}

impl AnalysisSession {
    /// Validate the configuration, select the target and load the symbol
    /// list. Nothing is disassembled yet.
    pub fn new(config: SessionConfig) -> Result<Self> {
        if config.inputs.is_empty() {
            return Err(Error::NoExecutables);
        }
        let target = target_for(&config.target)?;
        let mut registry = SymbolRegistry::new();
        let loaded = registry.load_file(&config.symbols)?;
        if loaded == 0 {
            warn!(symbols = %config.symbols.display(), "symbol list is empty");
        }

        let temps = TempFiles::new(config.keep_temps);
        let disassembler: Box<dyn DisassemblySource> = match &config.dump_extension {
            Some(ext) => Box::new(DumpFile::new(ext)),
            None => Box::new(ObjdumpCommand::for_target(target.as_ref(), temps.clone())),
        };
        let traces = reader_for(config.trace_format);

        info!(
            target = target.name(),
            symbols = loaded,
            executables = config.inputs.len(),
            "analysis session ready"
        );
        Ok(Self {
            config,
            target,
            registry,
            temps,
            disassembler,
            traces,
        })
    }

    /// Replace the disassembly source.
    #[must_use]
    pub fn with_disassembler(mut self, source: Box<dyn DisassemblySource>) -> Self {
        self.disassembler = source;
        self
    }

    /// Handle on the temporary files, for cleanup from a signal handler.
    #[must_use]
    pub fn temp_files(&self) -> TempFiles {
        self.temps.clone()
    }

    #[must_use]
    pub const fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    #[must_use]
    pub fn target(&self) -> &dyn TargetInfo {
        self.target.as_ref()
    }

    /// Parse, trace, merge and analyze every executable. Temporary files
    /// are removed whether or not the run succeeds.
    pub fn run(self) -> Result<AnalysisReport> {
        let temps = self.temps.clone();
        let result = self.execute();
        let removed = temps.cleanup();
        debug!(removed, ok = result.is_ok(), "temporary files cleaned up");
        result
    }

    fn execute(self) -> Result<AnalysisReport> {
        let start = Instant::now();
        let Self {
            config,
            target,
            mut registry,
            temps: _,
            disassembler,
            traces,
        } = self;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.jobs)
            .build()?;

        let contexts = config
            .inputs
            .iter()
            .enumerate()
            .map(|(index, input)| open_context(ExecutableId(index), input, config.library.as_deref()))
            .collect::<Result<Vec<_>>>()?;

        // Parse in parallel; each context's maps stay private until merge.
        let parsed = pool.install(|| {
            let parser = ObjdumpParser::new(target.as_ref(), &registry);
            contexts
                .into_par_iter()
                .map(|mut ctx| -> Result<_> {
                    let listing = disassembler.disassemble(&listing_path(&ctx))?;
                    let resolved = parser.parse(listing, &mut ctx)?;
                    Ok((ctx, resolved))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        // Adopt in input order so the first executable wins deterministically.
        let mut executables = Vec::with_capacity(parsed.len());
        let mut symbol_counts = Vec::with_capacity(parsed.len());
        for (ctx, resolved) in parsed {
            symbol_counts.push(resolved.len());
            for symbol in resolved {
                symbol.adopt_into(&mut registry, ctx.id())?;
            }
            executables.push(ctx);
        }

        let trace_summaries = pool.install(|| {
            executables
                .par_iter_mut()
                .zip(config.inputs.par_iter())
                .map(|(ctx, input)| apply_traces(traces.as_ref(), &input.traces, ctx))
                .collect::<Result<Vec<_>>>()
        })?;

        for ctx in &executables {
            ctx.merge_into(&mut registry)?;
        }

        let unresolved = registry.warn_unresolved();
        registry.compute_uncovered();
        let totals = registry.compute_statistics()?;

        let elapsed = start.elapsed().as_secs_f64();
        metrics::record_analysis(&totals, executables.len(), elapsed);
        info!(
            symbols = totals.symbols,
            unresolved,
            uncovered_ranges = totals.stats.uncovered_ranges,
            time = %format!("{elapsed:.3}s"),
            "analysis complete"
        );

        let summaries = executables
            .iter()
            .zip(symbol_counts)
            .zip(trace_summaries)
            .map(|((ctx, symbols), summary)| {
                metrics::record_trace(&ctx.file_name().to_string_lossy(), summary.entries);
                ExecutableSummary {
                    id: ctx.id(),
                    path: ctx.file_name().to_path_buf(),
                    symbols,
                    traces: summary,
                }
            })
            .collect();

        Ok(AnalysisReport {
            registry,
            totals,
            executables: summaries,
        })
    }
}

fn open_context(
    id: ExecutableId,
    input: &ExecutableInput,
    library: Option<&str>,
) -> Result<ExecutableContext> {
    let ctx = ExecutableContext::new(id, &input.executable);
    let Some(library) = library else {
        return Ok(ctx);
    };
    let mut ctx = ctx.with_library(library);
    LoadMap::load_for(&input.executable)?.resolve(&mut ctx)?;
    Ok(ctx)
}

/// A library is disassembled itself; its executable only supplies the
/// load map.
fn listing_path(ctx: &ExecutableContext) -> PathBuf {
    ctx.library_name()
        .map_or_else(|| ctx.file_name().to_path_buf(), PathBuf::from)
}

fn apply_traces(
    reader: &dyn TraceReader,
    traces: &[PathBuf],
    ctx: &mut ExecutableContext,
) -> Result<TraceSummary> {
    let mut total = TraceSummary::default();
    for trace in traces {
        let summary = reader.apply(trace, ctx)?;
        if summary.matched == 0 {
            warn!(
                trace = %trace.display(),
                executable = %ctx.file_name().display(),
                "trace hit no analyzed symbol"
            );
        }
        total.entries += summary.entries;
        total.matched += summary.matched;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paired_inputs() {
        let exes = vec![
            PathBuf::from("build/hello.exe"),
            PathBuf::from("build/ticker.exe"),
            PathBuf::from("build/noext"),
        ];
        let inputs = ExecutableInput::paired(&exes, ".exe", "cov");
        assert_eq!(inputs[0].traces, vec![PathBuf::from("build/hello.cov")]);
        assert_eq!(inputs[1].traces, vec![PathBuf::from("build/ticker.cov")]);
        assert_eq!(inputs[2].traces, vec![PathBuf::from("build/noext.cov")]);
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::new("sparc-rtems6", "symbols.txt")
            .with_input(ExecutableInput::new("a.exe", vec![PathBuf::from("a.cov")]))
            .with_trace_format(TraceFormat::Pcs)
            .with_jobs(2)
            .with_keep_temps(true);
        assert_eq!(config.inputs.len(), 1);
        assert_eq!(config.trace_format, TraceFormat::Pcs);
        assert_eq!(config.jobs, 2);
        assert!(config.keep_temps);
        assert!(config.library.is_none());
    }

    #[test]
    fn test_no_executables_is_error() {
        let config = SessionConfig::new("sparc-rtems6", "symbols.txt");
        assert!(matches!(AnalysisSession::new(config), Err(Error::NoExecutables)));
    }

    #[test]
    fn test_unknown_target_is_error() {
        let config = SessionConfig::new("vax-bsd", "symbols.txt")
            .with_input(ExecutableInput::new("a.exe", Vec::new()));
        assert!(matches!(AnalysisSession::new(config), Err(Error::Target(_))));
    }
}
