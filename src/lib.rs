//! # topn
//!
//! Find the **N most frequent lines** (typically URLs) of an input that does
//! not fit in memory, with a single pass over the input and bounded memory.
//!
//! ## How it works
//!
//! The computation is a local, two-phase map-reduce:
//!
//! 1. **Map** ([`map`]) - read the input once, route each item to one of
//!    `n_reduce` partitions by hash ([`partitioner`]), count it in that
//!    partition's in-memory table and spill the table to the partition's
//!    file whenever it grows past a threshold.
//! 2. **Reduce** ([`scheduler`], [`reduce`]) - a worker pool rebuilds each
//!    partition's full frequency table from its spilled batches and keeps
//!    only that partition's top-N in a bounded heap ([`heap`]).
//! 3. **Merge** ([`merge`]) - the per-partition heaps are merged into one
//!    global top-N heap and written as `item: count` lines.
//!
//! Every occurrence of an item lands in the same partition, so the global
//! top-N is always contained in the union of the per-partition top-N sets.
//! That is what makes discarding everything else per partition safe.
//!
//! Ties are broken by item, ascending, so the output is identical across
//! runs, partition counts and thread schedules.
//!
//! ## Quick Start
//!
//! ```no_run
//! use topn::{TopN, TopNConfig};
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let config = TopNConfig::default().with_n(100).with_partitions(64);
//! let report = TopN::new(config).run("urls.txt", "top-100-result", "./tmp")?;
//! println!("{} result lines in {:?}", report.result_lines, report.elapsed());
//! # Ok(())
//! # }
//! ```
//!
//! ## Reusing a worker pool
//!
//! ```no_run
//! use topn::{Scheduler, TopN, TopNConfig};
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let mut pool = Scheduler::new(8);
//! pool.start()?;
//! let job = TopN::new(TopNConfig::default());
//! job.run_with(&pool, "day1.txt", "day1-top", "./tmp")?;
//! job.run_with(&pool, "day2.txt", "day2-top", "./tmp")?;
//! pool.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `spilling` - binary (`postcard`) partition-file records
//! - `compression-gzip` - gzip-compressed spill frames
//! - `compression-zstd` - zstd-compressed spill frames
//!
//! ## Module Overview
//!
//! - [`record`] - count records and the ranking order
//! - [`heap`] - fixed-capacity top-K heap
//! - [`partitioner`] - item → partition routing (FNV-1a)
//! - [`io`] - partition-file formats and compression
//! - [`map`] - the map phase
//! - [`reduce`] / [`scheduler`] - reduce tasks and the worker pool
//! - [`merge`] - global merge and result file
//! - [`runner`] - configuration and the end-to-end driver
//! - [`metrics`] - counters and phase timings
//! - [`testing`] - data generators and assertions for tests

pub mod heap;
pub mod io;
pub mod map;
pub mod merge;
pub mod metrics;
pub mod partitioner;
pub mod record;
pub mod reduce;
pub mod runner;
pub mod scheduler;
pub mod testing;

pub use heap::TopKHeap;
pub use io::{Compression, RecordFormat, SpillCodec};
pub use map::{MapOptions, MapStats, run_map};
pub use merge::{merge_heaps, result_file_name, write_result};
pub use metrics::MetricsCollector;
pub use partitioner::{HashPartitioner, Partitioner, hash_item};
pub use record::UrlCount;
pub use reduce::{ReduceOutcome, ReduceTask, reduce_partition};
pub use runner::{DataSize, RunReport, TopN, TopNConfig, buffer_size_for_budget};
pub use scheduler::{Scheduler, TaskHandle};
