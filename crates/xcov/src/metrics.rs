//! Run metrics using metrics-rs.
//!
//! The CLI installs [`CliRecorder`] when `--metrics` is given and prints the
//! collected values after the command finishes.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit, counter,
    describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use parking_lot::RwLock;
use xcov_coverage::Totals;

/// Register metric descriptions. Call once at startup.
pub fn init() {
    describe_counter!(
        "xcov_executables_total",
        Unit::Count,
        "Executables disassembled and traced"
    );
    describe_counter!(
        "xcov_symbols_total",
        Unit::Count,
        "Symbols requested for analysis"
    );
    describe_counter!(
        "xcov_unresolved_symbols_total",
        Unit::Count,
        "Requested symbols found in no executable"
    );
    describe_counter!(
        "xcov_uncovered_ranges_total",
        Unit::Count,
        "Uncovered instruction ranges"
    );
    describe_counter!(
        "xcov_branches_uncovered_total",
        Unit::Count,
        "Branches with at least one direction never exercised"
    );
    describe_counter!(
        "xcov_trace_entries_total",
        Unit::Count,
        "Program counters read from traces"
    );

    describe_gauge!(
        "xcov_executed_bytes_percent",
        Unit::Percent,
        "Share of analyzed bytes that executed"
    );

    describe_histogram!(
        "xcov_analysis_duration_seconds",
        Unit::Seconds,
        "Wall-clock time of one analysis run"
    );
}

/// Record the outcome of an analysis run.
#[allow(clippy::cast_precision_loss)]
pub fn record_analysis(totals: &Totals, executables: usize, elapsed_secs: f64) {
    counter!("xcov_executables_total").absolute(executables as u64);
    counter!("xcov_symbols_total").absolute(totals.symbols);
    counter!("xcov_unresolved_symbols_total").absolute(totals.unresolved_symbols);
    counter!("xcov_uncovered_ranges_total").absolute(totals.stats.uncovered_ranges);
    counter!("xcov_branches_uncovered_total").absolute(totals.stats.branches_uncovered());
    gauge!("xcov_executed_bytes_percent").set(totals.stats.percent_executed_bytes() as f64);
    histogram!("xcov_analysis_duration_seconds").record(elapsed_secs);
}

/// Record how many trace entries one executable consumed.
pub fn record_trace(executable: &str, entries: u64) {
    let labels = [("executable", executable.to_string())];
    counter!("xcov_trace_entries_total", &labels).increment(entries);
}

#[derive(Default)]
struct CounterStorage {
    values: RwLock<HashMap<String, u64>>,
}

#[derive(Default)]
struct GaugeStorage {
    values: RwLock<HashMap<String, f64>>,
}

#[derive(Default)]
struct HistogramStorage {
    values: RwLock<HashMap<String, Vec<f64>>>,
}

struct CliCounter {
    key: String,
    storage: Arc<CounterStorage>,
}

impl metrics::CounterFn for CliCounter {
    fn increment(&self, value: u64) {
        *self.storage.values.write().entry(self.key.clone()).or_insert(0) += value;
    }

    fn absolute(&self, value: u64) {
        self.storage.values.write().insert(self.key.clone(), value);
    }
}

struct CliGauge {
    key: String,
    storage: Arc<GaugeStorage>,
}

impl metrics::GaugeFn for CliGauge {
    fn increment(&self, value: f64) {
        *self.storage.values.write().entry(self.key.clone()).or_insert(0.0) += value;
    }

    fn decrement(&self, value: f64) {
        *self.storage.values.write().entry(self.key.clone()).or_insert(0.0) -= value;
    }

    fn set(&self, value: f64) {
        self.storage.values.write().insert(self.key.clone(), value);
    }
}

struct CliHistogram {
    key: String,
    storage: Arc<HistogramStorage>,
}

impl metrics::HistogramFn for CliHistogram {
    fn record(&self, value: f64) {
        self.storage
            .values
            .write()
            .entry(self.key.clone())
            .or_default()
            .push(value);
    }
}

/// In-memory recorder for printing a summary at exit.
#[derive(Default)]
pub struct CliRecorder {
    counters: Arc<CounterStorage>,
    gauges: Arc<GaugeStorage>,
    histograms: Arc<HistogramStorage>,
}

impl CliRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install as the global recorder. Returns `None` if one is already set.
    #[must_use]
    pub fn install(self) -> Option<CliRecorderHandle> {
        let handle = CliRecorderHandle {
            counters: Arc::clone(&self.counters),
            gauges: Arc::clone(&self.gauges),
            histograms: Arc::clone(&self.histograms),
        };
        metrics::set_global_recorder(self).ok()?;
        Some(handle)
    }
}

fn key_to_string(key: &Key) -> String {
    let mut labels = key.labels().peekable();
    if labels.peek().is_none() {
        return key.name().to_string();
    }
    let labels: Vec<String> = labels.map(|l| format!("{}={}", l.key(), l.value())).collect();
    format!("{}{{{}}}", key.name(), labels.join(","))
}

impl Recorder for CliRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(CliCounter {
            key: key_to_string(key),
            storage: Arc::clone(&self.counters),
        }))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(Arc::new(CliGauge {
            key: key_to_string(key),
            storage: Arc::clone(&self.gauges),
        }))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(CliHistogram {
            key: key_to_string(key),
            storage: Arc::clone(&self.histograms),
        }))
    }
}

/// Read access to what the installed [`CliRecorder`] collected.
pub struct CliRecorderHandle {
    counters: Arc<CounterStorage>,
    gauges: Arc<GaugeStorage>,
    histograms: Arc<HistogramStorage>,
}

impl CliRecorderHandle {
    #[must_use]
    pub fn get_counter(&self, key: &str) -> Option<u64> {
        self.counters.values.read().get(key).copied()
    }

    #[must_use]
    pub fn get_gauge(&self, key: &str) -> Option<f64> {
        self.gauges.values.read().get(key).copied()
    }

    /// Render every collected metric, sorted by key.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn render_summary(&self) -> String {
        use std::fmt::Write;

        let counters = self.counters.values.read();
        let gauges = self.gauges.values.read();
        let histograms = self.histograms.values.read();
        if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
            return "No metrics collected.\n".to_string();
        }

        let mut out = String::from("\n## Metrics Summary\n\n");
        if !counters.is_empty() {
            out.push_str("### Counters\n");
            let mut entries: Vec<_> = counters.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (key, value) in entries {
                let _ = writeln!(out, "  {key}: {value}");
            }
            out.push('\n');
        }
        if !gauges.is_empty() {
            out.push_str("### Gauges\n");
            let mut entries: Vec<_> = gauges.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (key, value) in entries {
                let _ = writeln!(out, "  {key}: {value:.2}");
            }
            out.push('\n');
        }
        if !histograms.is_empty() {
            out.push_str("### Histograms\n");
            let mut entries: Vec<_> = histograms.iter().filter(|(_, v)| !v.is_empty()).collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (key, values) in entries {
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let avg = values.iter().sum::<f64>() / values.len() as f64;
                let _ = writeln!(
                    out,
                    "  {key}: count={}, min={min:.6}, max={max:.6}, avg={avg:.6}",
                    values.len()
                );
            }
            out.push('\n');
        }
        out
    }

    pub fn print_summary(&self) {
        print!("{}", self.render_summary());
    }
}
