//! Metrics collection and reporting for top-N runs.
//!
//! A [`MetricsCollector`] gathers named counters and phase timings while a
//! run executes. The runner fills in:
//!
//! - counters: `input_lines`, `spills`, `records_spilled`,
//!   `partition_records_read`, `distinct_items`, `result_lines`
//! - phases: `map`, `reduce`, `merge`
//!
//! # Example
//!
//! ```no_run
//! use topn::metrics::MetricsCollector;
//! use std::time::Duration;
//!
//! # fn main() -> anyhow::Result<()> {
//! let metrics = MetricsCollector::new();
//! metrics.record_start();
//! metrics.increment_counter("input_lines", 42);
//! metrics.record_phase("map", Duration::from_millis(12));
//! metrics.record_end();
//!
//! metrics.print();
//! metrics.save_to_file("metrics.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Thread-safe container for run counters and phase timings.
///
/// Cloning is cheap and clones share the same underlying storage.
#[derive(Clone, Debug, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsCollectorInner>>,
}

#[derive(Debug, Default)]
struct MetricsCollectorInner {
    counters: BTreeMap<String, u64>,
    phases: BTreeMap<String, Duration>,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Metrics are best-effort: a poisoned lock still holds usable numbers.
    fn lock(&self) -> MutexGuard<'_, MetricsCollectorInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Record the start time of the run.
    pub fn record_start(&self) {
        self.lock().start_time = Some(Instant::now());
    }

    /// Record the end time of the run.
    pub fn record_end(&self) {
        self.lock().end_time = Some(Instant::now());
    }

    /// Wall time between [`record_start`](Self::record_start) and
    /// [`record_end`](Self::record_end), if both were called.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let inner = self.lock();
        match (inner.start_time, inner.end_time) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// Add `value` to the counter `name`, creating it at zero if needed.
    pub fn increment_counter(&self, name: &str, value: u64) {
        *self.lock().counters.entry(name.to_string()).or_insert(0) += value;
    }

    pub fn set_counter(&self, name: &str, value: u64) {
        self.lock().counters.insert(name.to_string(), value);
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.lock().counters.get(name).copied()
    }

    /// Add `elapsed` to the accumulated time of phase `name`.
    pub fn record_phase(&self, name: &str, elapsed: Duration) {
        *self.lock().phases.entry(name.to_string()).or_default() += elapsed;
    }

    /// Run `f`, charging its wall time to phase `name`.
    pub fn time_phase<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let out = f();
        self.record_phase(name, start.elapsed());
        out
    }

    #[must_use]
    pub fn phase(&self, name: &str) -> Option<Duration> {
        self.lock().phases.get(name).copied()
    }

    /// All counters by name.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.lock().counters.clone()
    }

    /// Counters, phase timings (ms) and total execution time (ms) as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let inner = self.lock();
        let phases: serde_json::Map<String, Value> = inner
            .phases
            .iter()
            .map(|(name, d)| (name.clone(), json!(d.as_millis())))
            .collect();
        let mut out = json!({
            "counters": inner.counters,
            "phases_ms": phases,
        });
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            out["execution_time_ms"] = json!(end.duration_since(start).as_millis());
        }
        out
    }

    /// Print all metrics to stdout in a human-readable format.
    pub fn print(&self) {
        println!("\n============ Top-N Metrics ============");
        let inner = self.lock();
        if let (Some(start), Some(end)) = (inner.start_time, inner.end_time) {
            let elapsed = end.duration_since(start);
            println!(
                "Execution Time: {:.3}s ({} ms)",
                elapsed.as_secs_f64(),
                elapsed.as_millis()
            );
            println!("---------------------------------------");
        }
        for (name, d) in &inner.phases {
            println!("phase {name}: {:.3}s", d.as_secs_f64());
        }
        for (name, value) in &inner.counters {
            println!("{name}: {value}");
        }
        drop(inner);
        println!("=======================================\n");
    }

    /// Save all metrics to a pretty-printed JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        file.write_all(formatted.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}
