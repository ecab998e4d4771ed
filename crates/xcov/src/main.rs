//! xcov CLI - coverage analysis for cross-compiled binaries

mod cli;
mod commands;
mod terminal;

use std::panic;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use cli::{Cli, EXIT_FAULT};

fn main() {
    let cli = Cli::parse();

    let metrics_handle = if cli.metrics {
        xcov::metrics::CliRecorder::new().install()
    } else {
        None
    };
    xcov::metrics::init();

    let level = if cli.verbose {
        "xcov=debug"
    } else if cli.silent {
        "xcov=error"
    } else {
        "xcov=info"
    };
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = level.parse::<Directive>() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = panic::catch_unwind(|| commands::run_command(&cli)).unwrap_or_else(|_| {
        terminal::error("internal error, aborting");
        EXIT_FAULT
    });

    if let Some(handle) = metrics_handle {
        handle.print_summary();
    }

    std::process::exit(exit_code);
}
