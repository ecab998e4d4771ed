//! Analyze command.

use tracing::{error, warn};
use xcov::{AnalysisReport, AnalysisSession, ExecutableInput, SessionConfig, Statistics, TempFiles};

use crate::cli::{AnalyzeArgs, EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_SUCCESS};
use crate::terminal::{self, Alignment, Spinner, Table};

/// Handle the `analyze` command.
pub fn cmd_analyze(args: &AnalyzeArgs, silent: bool) -> i32 {
    let inputs = match collect_inputs(args) {
        Ok(inputs) => inputs,
        Err(message) => {
            terminal::error(&message);
            return EXIT_FAILURE;
        }
    };

    let config = SessionConfig::new(&args.target, &args.symbols)
        .with_inputs(inputs)
        .with_trace_format(args.format.into())
        .with_library(args.library.clone())
        .with_dump_extension(args.dump_extension.clone())
        .with_jobs(args.jobs)
        .with_keep_temps(args.keep_temps);

    let session = match AnalysisSession::new(config) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "cannot start analysis");
            return EXIT_FAILURE;
        }
    };
    let temps = session.temp_files();
    install_signal_handler(temps.clone());

    let spinner = if silent {
        Spinner::hidden()
    } else {
        Spinner::new(format!("analyzing {} executable(s)", args_count(args)))
    };
    match session.run() {
        Ok(report) => {
            spinner.finish_with_success("analysis complete");
            if !silent {
                print_summary(&report);
                if args.symbols_table {
                    symbol_table(&report).print();
                }
            }
            EXIT_SUCCESS
        }
        Err(e) => {
            // The signal handler's clone keeps the registry alive until exit.
            temps.cleanup();
            spinner.finish_with_failure("analysis failed");
            error!(error = %e, "analysis failed");
            EXIT_FAILURE
        }
    }
}

fn collect_inputs(args: &AnalyzeArgs) -> Result<Vec<ExecutableInput>, String> {
    if let Some(single) = &args.single {
        if args.files.is_empty() {
            warn!(executable = %single.display(), "no trace files given");
        }
        return Ok(vec![ExecutableInput::new(single, args.files.clone())]);
    }
    match (&args.executable_ext, &args.trace_ext) {
        (Some(exe_ext), Some(trace_ext)) => {
            Ok(ExecutableInput::paired(&args.files, exe_ext, trace_ext))
        }
        _ => Err("give either -1 EXECUTABLE TRACE... or -e EXT -c EXT EXECUTABLE...".to_string()),
    }
}

const fn args_count(args: &AnalyzeArgs) -> usize {
    if args.single.is_some() { 1 } else { args.files.len() }
}

fn install_signal_handler(temps: TempFiles) {
    let result = ctrlc::set_handler(move || {
        let removed = temps.cleanup();
        terminal::warning(&format!("interrupted, removed {removed} temporary file(s)"));
        std::process::exit(EXIT_INTERRUPTED);
    });
    if let Err(e) = result {
        warn!(error = %e, "cannot install signal handler");
    }
}

fn print_summary(report: &AnalysisReport) {
    let totals = &report.totals;
    let stats = &totals.stats;

    let mut table = Table::new(&["", "count"]).with_alignments(vec![Alignment::Left, Alignment::Right]);
    let rows: [(&str, u64); 12] = [
        ("symbols analyzed", totals.symbols),
        ("symbols unresolved", totals.unresolved_symbols),
        ("bytes analyzed", stats.size_in_bytes),
        ("bytes not executed", stats.uncovered_bytes),
        ("% executed", stats.percent_executed_bytes()),
        ("instructions analyzed", stats.size_in_instructions),
        ("uncovered ranges", stats.uncovered_ranges),
        ("branches found", stats.branches_found()),
        ("branches uncovered", stats.branches_uncovered()),
        ("branches always taken", stats.branches_always_taken),
        ("branches never taken", stats.branches_never_taken),
        ("branches not executed", stats.branches_not_executed),
    ];
    for (label, value) in rows {
        table.add_row(vec![label.to_string(), value.to_string()]);
    }
    println!();
    table.print();

    for exe in &report.executables {
        terminal::info(&format!(
            "{}: {} symbol(s), {} of {} trace entries matched",
            exe.path.display(),
            exe.symbols,
            exe.traces.matched,
            exe.traces.entries
        ));
    }
}

fn symbol_table(report: &AnalysisReport) -> Table {
    let mut table = Table::new(&[
        "symbol",
        "bytes",
        "uncovered bytes",
        "ranges",
        "branches",
        "uncovered branches",
        "% executed",
    ])
    .with_alignments(vec![
        Alignment::Left,
        Alignment::Right,
        Alignment::Right,
        Alignment::Right,
        Alignment::Right,
        Alignment::Right,
        Alignment::Right,
    ]);

    for info in report.registry.iter() {
        if !info.is_resolved() {
            table.add_row(vec![
                info.name.clone(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                "unresolved".to_string(),
            ]);
            continue;
        }
        table.add_row(symbol_row(&info.name, &info.stats));
    }
    table
}

fn symbol_row(name: &str, stats: &Statistics) -> Vec<String> {
    vec![
        name.to_string(),
        stats.size_in_bytes.to_string(),
        stats.uncovered_bytes.to_string(),
        stats.uncovered_ranges.to_string(),
        stats.branches_found().to_string(),
        stats.branches_uncovered().to_string(),
        stats.percent_executed_bytes().to_string(),
    ]
}
