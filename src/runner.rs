//! Run configuration and the map → reduce → merge driver.

use crate::io::partition::SpillCodec;
use crate::map::{MapOptions, MapStats, run_map};
use crate::merge::{merge_heaps, write_result};
use crate::metrics::MetricsCollector;
use crate::partitioner::{HashPartitioner, Partitioner};
use crate::reduce::ReduceTask;
use crate::scheduler::Scheduler;
use anyhow::{Context, Result, bail};
use std::fmt;
use std::fs::{create_dir_all, remove_dir_all};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const KIB: u64 = 1 << 10;
pub const MIB: u64 = 1 << 20;
pub const GIB: u64 = 1 << 30;

/// Per-partition table threshold derived from a memory budget:
/// `budget / workers / n_reduce`, at least 1.
#[must_use]
pub fn buffer_size_for_budget(budget_bytes: u64, workers: usize, n_reduce: usize) -> usize {
    let per = budget_bytes / workers.max(1) as u64 / n_reduce.max(1) as u64;
    usize::try_from(per).unwrap_or(usize::MAX).max(1)
}

/// Settings of one top-N run.
#[derive(Clone, Debug)]
pub struct TopNConfig {
    /// How many of the most frequent items to report.
    pub n: usize,
    /// Number of partitions (and partition files).
    pub n_reduce: usize,
    /// Reduce worker threads.
    pub workers: usize,
    /// Distinct items a partition table may hold before it is spilled.
    pub buffer_size: usize,
    /// On-disk encoding of partition files.
    pub codec: SpillCodec,
    /// Spill on the rayon pool while the input is still being read.
    pub concurrent_spills: bool,
    /// Leave the (emptied) work directory in place after a successful run.
    pub keep_work_dir: bool,
}

impl Default for TopNConfig {
    fn default() -> Self {
        let workers = num_cpus::get().max(1);
        let n_reduce = 500;
        Self {
            n: 100,
            n_reduce,
            workers,
            buffer_size: buffer_size_for_budget(GIB, workers, n_reduce),
            codec: SpillCodec::default(),
            concurrent_spills: true,
            keep_work_dir: false,
        }
    }
}

impl TopNConfig {
    #[must_use]
    pub fn with_n(mut self, n: usize) -> Self {
        self.n = n;
        self
    }

    #[must_use]
    pub fn with_partitions(mut self, n_reduce: usize) -> Self {
        self.n_reduce = n_reduce;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    #[must_use]
    pub fn with_codec(mut self, codec: SpillCodec) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub fn with_concurrent_spills(mut self, on: bool) -> Self {
        self.concurrent_spills = on;
        self
    }

    #[must_use]
    pub fn with_keep_work_dir(mut self, keep: bool) -> Self {
        self.keep_work_dir = keep;
        self
    }

    /// # Errors
    /// Returns an error if `n_reduce`, `workers` or `buffer_size` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.n_reduce == 0 {
            bail!("n_reduce must be at least 1");
        }
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.buffer_size == 0 {
            bail!("buffer_size must be at least 1");
        }
        Ok(())
    }
}

/// Summary of a finished run.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub map: MapStats,
    pub partitions: usize,
    /// Count records read back across all partition files.
    pub records_read: u64,
    /// Distinct items across all partitions.
    pub distinct_items: u64,
    /// Lines written to the result file.
    pub result_lines: usize,
    pub metrics: MetricsCollector,
}

impl RunReport {
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.metrics.elapsed().unwrap_or_default()
    }
}

/// The top-N driver.
///
/// ```no_run
/// use topn::{TopN, TopNConfig};
///
/// # fn main() -> anyhow::Result<()> {
/// let report = TopN::new(TopNConfig::default().with_n(10))
///     .run("urls.txt", "top-10-result", "./tmp")?;
/// println!("{} lines in {:?}", report.result_lines, report.elapsed());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TopN {
    config: TopNConfig,
    /// `None` routes with a [`HashPartitioner`] over `config.n_reduce`.
    partitioner: Option<Arc<dyn Partitioner>>,
}

impl TopN {
    /// The configuration is checked when a run starts, not here.
    #[must_use]
    pub fn new(config: TopNConfig) -> Self {
        Self {
            config,
            partitioner: None,
        }
    }

    /// Route items with `partitioner` instead of the FNV-1a default. Its
    /// partition count replaces `n_reduce`.
    #[must_use]
    pub fn with_partitioner(mut self, partitioner: Arc<dyn Partitioner>) -> Self {
        self.config.n_reduce = partitioner.partitions();
        self.partitioner = Some(partitioner);
        self
    }

    #[must_use]
    pub fn config(&self) -> &TopNConfig {
        &self.config
    }

    /// Run with a private scheduler that is started before and shut down
    /// after the run.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or any phase fails.
    pub fn run(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        work_dir: impl AsRef<Path>,
    ) -> Result<RunReport> {
        self.config.validate()?;
        let mut scheduler = Scheduler::new(self.config.workers);
        scheduler.start()?;
        let report = self.run_with(&scheduler, input, output, work_dir);
        scheduler.shutdown();
        report
    }

    /// Run on a caller-owned scheduler that is already started. The
    /// scheduler stays running afterwards and can serve further runs.
    ///
    /// The work directory is wiped and recreated first, and removed after
    /// a successful run unless [`TopNConfig::keep_work_dir`] is set. On
    /// failure it is left as is and no result file is written. The output
    /// must therefore lie outside the work directory.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, the output lies
    /// inside the work directory, the scheduler is not running, the work
    /// directory cannot be reset, or any phase fails.
    pub fn run_with(
        &self,
        scheduler: &Scheduler,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        work_dir: impl AsRef<Path>,
    ) -> Result<RunReport> {
        let (input, output, work_dir) = (input.as_ref(), output.as_ref(), work_dir.as_ref());
        self.config.validate()?;
        check_output_outside(output, work_dir)?;
        if !scheduler.is_running() {
            bail!("scheduler is not started");
        }
        let cfg = &self.config;
        let metrics = MetricsCollector::new();
        metrics.record_start();

        reset_work_dir(work_dir)?;

        let partitioner: Arc<dyn Partitioner> = match &self.partitioner {
            Some(p) => Arc::clone(p),
            None => Arc::new(HashPartitioner::new(cfg.n_reduce)),
        };
        let opts = MapOptions {
            buffer_size: cfg.buffer_size,
            codec: cfg.codec,
            concurrent_spills: cfg.concurrent_spills,
        };
        let mapped = metrics.time_phase("map", || {
            run_map(input, work_dir, partitioner.as_ref(), &opts)
        })?;
        let map = mapped.stats;
        let partitions = mapped.files.len();

        let tasks: Vec<ReduceTask> = mapped
            .files
            .into_iter()
            .map(|f| ReduceTask::new(f, cfg.codec, cfg.n))
            .collect();
        info!(tasks = tasks.len(), "reduce phase started");
        let outcomes = metrics.time_phase("reduce", || scheduler.dispatch(tasks))?;
        let records_read: u64 = outcomes.iter().map(|o| o.records_read).sum();
        let distinct_items: u64 = outcomes.iter().map(|o| o.distinct_items).sum();
        info!(records_read, distinct_items, "reduce phase finished");

        let result_lines = metrics.time_phase("merge", || {
            let merged = merge_heaps(outcomes.iter().map(|o| &o.heap), cfg.n);
            write_result(output, &merged.into_sorted_vec())
        })?;
        info!(output = %output.display(), lines = result_lines, "result written");

        if !cfg.keep_work_dir {
            remove_dir_all(work_dir)
                .with_context(|| format!("remove work dir {}", work_dir.display()))?;
        }

        metrics.set_counter("input_lines", map.lines);
        metrics.set_counter("spills", map.spills);
        metrics.set_counter("records_spilled", map.records_spilled);
        metrics.set_counter("partition_records_read", records_read);
        metrics.set_counter("distinct_items", distinct_items);
        metrics.set_counter("result_lines", result_lines as u64);
        metrics.record_end();

        Ok(RunReport {
            map,
            partitions,
            records_read,
            distinct_items,
            result_lines,
            metrics,
        })
    }
}

/// The work directory is wiped before and removed after a run, so a result
/// file inside it would be lost.
fn check_output_outside(output: &Path, work_dir: &Path) -> Result<()> {
    let out = std::path::absolute(output)
        .with_context(|| format!("resolve output path {}", output.display()))?;
    let work = std::path::absolute(work_dir)
        .with_context(|| format!("resolve work dir {}", work_dir.display()))?;
    if out.starts_with(&work) {
        bail!(
            "output {} lies inside work dir {}, which is cleared by every run",
            output.display(),
            work_dir.display()
        );
    }
    Ok(())
}

/// Remove anything at `dir` and create it empty.
fn reset_work_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        warn!(dir = %dir.display(), "clearing existing work directory");
        remove_dir_all(dir).with_context(|| format!("clear work dir {}", dir.display()))?;
    }
    create_dir_all(dir).with_context(|| format!("create work dir {}", dir.display()))
}

/// A byte count that prints and parses with binary units (`512MB`, `1GB`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DataSize(pub u64);

impl fmt::Display for DataSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.0;
        if d < KIB {
            write!(f, "{d}byte")
        } else if d < MIB {
            write!(f, "{}KB", d / KIB)
        } else if d < GIB {
            write!(f, "{}MB", d / MIB)
        } else {
            write!(f, "{}GB", d / GIB)
        }
    }
}

impl FromStr for DataSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let value: u64 = digits
            .parse()
            .with_context(|| format!("invalid size {s:?}"))?;
        let scale = match unit.trim().to_ascii_uppercase().as_str() {
            "" | "B" | "BYTE" | "BYTES" => 1,
            "K" | "KB" | "KIB" => KIB,
            "M" | "MB" | "MIB" => MIB,
            "G" | "GB" | "GIB" => GIB,
            other => bail!("unknown size unit {other:?} in {s:?}"),
        };
        value
            .checked_mul(scale)
            .map(DataSize)
            .with_context(|| format!("size {s:?} overflows"))
    }
}
