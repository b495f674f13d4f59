//! The map phase: partition, combine and spill.
//!
//! The input is read once. Each line is routed to its partition and counted
//! in that partition's in-memory table. When a table reaches
//! [`MapOptions::buffer_size`] distinct items it is appended to the
//! partition's file as one spill batch and replaced by an empty table. At
//! end of input every non-empty table is spilled.
//!
//! Lines are split on `\n` and one trailing `\r` is dropped. Empty lines are
//! skipped rather than counted, so `""` never appears in a result even when
//! the input has blank lines. A `\r` inside a line is part of the item.
//!
//! With [`MapOptions::concurrent_spills`] the spills run on the `rayon` pool
//! while reading continues. Each partition file sits behind its own mutex,
//! so batches of one partition never interleave and batches of different
//! partitions never share a file.

use crate::io::partition::{PartitionFile, SpillCodec};
use crate::partitioner::Partitioner;
use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

/// Tuning for the map phase.
#[derive(Clone, Copy, Debug)]
pub struct MapOptions {
    /// Distinct items a partition table may hold before it is spilled.
    pub buffer_size: usize,
    /// On-disk encoding of spill batches.
    pub codec: SpillCodec,
    /// Spill on the rayon pool instead of on the reading thread.
    pub concurrent_spills: bool,
}

/// Counters from one map phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MapStats {
    /// Items read (non-empty input lines).
    pub lines: u64,
    /// Spill batches appended across all partitions.
    pub spills: u64,
    /// Count records written across all spills.
    pub records_spilled: u64,
}

/// The finished partition files plus the phase counters.
#[derive(Debug)]
pub struct MapOutput {
    pub files: Vec<PartitionFile>,
    pub stats: MapStats,
}

/// Shared spill state: one locked file per partition and the counters.
struct Spiller<'a> {
    files: Vec<Mutex<PartitionFile>>,
    codec: &'a SpillCodec,
    spills: AtomicU64,
    records: AtomicU64,
    failed: AtomicBool,
    failure: Mutex<Option<anyhow::Error>>,
}

impl Spiller<'_> {
    fn spill(&self, partition: usize, batch: &HashMap<String, u64>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let file = self.files[partition]
            .lock()
            .map_err(|_| anyhow!("partition {partition} file lock poisoned"))?;
        let written = file.append(self.codec, batch)?;
        drop(file);
        self.spills.fetch_add(1, Ordering::Relaxed);
        self.records.fetch_add(written as u64, Ordering::Relaxed);
        debug!(partition, records = written, "spilled partition table");
        Ok(())
    }

    /// Spill from a background job, parking the first error for the reader.
    fn spill_detached(&self, partition: usize, batch: HashMap<String, u64>) {
        if let Err(e) = self.spill(partition, &batch) {
            self.failed.store(true, Ordering::Release);
            if let Ok(mut slot) = self.failure.lock()
                && slot.is_none()
            {
                *slot = Some(e);
            }
        }
    }

    fn take_failure(&self) -> Option<anyhow::Error> {
        self.failure.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Run the map phase over `input`, writing one partition file per partition
/// into the existing directory `work_dir`.
///
/// Every partition file is created (empty) before the first line is read,
/// so the reduce phase always finds one file per partition.
///
/// # Errors
/// Any I/O failure is fatal: a partition file that cannot be created, an
/// input that cannot be opened or read (including invalid UTF-8), or a spill
/// that cannot be written.
pub fn run_map(
    input: impl AsRef<Path>,
    work_dir: impl AsRef<Path>,
    partitioner: &dyn Partitioner,
    opts: &MapOptions,
) -> Result<MapOutput> {
    let input = input.as_ref();
    let work_dir = work_dir.as_ref();
    let n_reduce = partitioner.partitions();
    let buffer_size = opts.buffer_size.max(1);

    let files = (0..n_reduce)
        .map(|id| PartitionFile::create(work_dir, id).map(Mutex::new))
        .collect::<Result<Vec<_>>>()?;
    let spiller = Spiller {
        files,
        codec: &opts.codec,
        spills: AtomicU64::new(0),
        records: AtomicU64::new(0),
        failed: AtomicBool::new(false),
        failure: Mutex::new(None),
    };

    let f = File::open(input).with_context(|| format!("open input {}", input.display()))?;
    let mut rdr = BufReader::with_capacity(1 << 20, f);
    let mut tables: Vec<HashMap<String, u64>> = (0..n_reduce).map(|_| HashMap::new()).collect();

    info!(
        input = %input.display(),
        n_reduce,
        buffer_size,
        concurrent = opts.concurrent_spills,
        "map phase started"
    );

    let lines = if opts.concurrent_spills {
        let spiller = &spiller;
        rayon::scope(|s| {
            read_input(&mut rdr, input, |item| {
                let p = partitioner.partition(item);
                if bump(&mut tables[p], item) >= buffer_size {
                    let batch = std::mem::take(&mut tables[p]);
                    s.spawn(move |_| spiller.spill_detached(p, batch));
                }
                if spiller.failed.load(Ordering::Acquire) {
                    return Err(anyhow!("spill failed"));
                }
                Ok(())
            })
        })
    } else {
        read_input(&mut rdr, input, |item| {
            let p = partitioner.partition(item);
            if bump(&mut tables[p], item) >= buffer_size {
                let batch = std::mem::take(&mut tables[p]);
                spiller.spill(p, &batch)?;
            }
            Ok(())
        })
    };

    // A detached spill failure outranks the reader's generic "spill failed".
    if let Some(e) = spiller.take_failure() {
        return Err(e);
    }
    let lines = lines?;

    tables
        .into_par_iter()
        .enumerate()
        .try_for_each(|(p, table)| spiller.spill(p, &table))?;

    let stats = MapStats {
        lines,
        spills: spiller.spills.load(Ordering::Relaxed),
        records_spilled: spiller.records.load(Ordering::Relaxed),
    };
    let files = spiller
        .files
        .into_iter()
        .map(|m| m.into_inner().map_err(|_| anyhow!("partition file lock poisoned")))
        .collect::<Result<Vec<_>>>()?;

    info!(
        lines = stats.lines,
        spills = stats.spills,
        records = stats.records_spilled,
        "map phase finished"
    );
    Ok(MapOutput { files, stats })
}

/// Increment `item` in `table`; returns the table's distinct-item count.
fn bump(table: &mut HashMap<String, u64>, item: &str) -> usize {
    match table.get_mut(item) {
        Some(c) => *c += 1,
        None => {
            table.insert(item.to_owned(), 1);
        }
    }
    table.len()
}

/// Feed every non-empty line of `rdr` to `on_item`, stopping at its first
/// error. A trailing `\r` is stripped. Returns the number of items fed.
fn read_input<R, F>(rdr: &mut R, path: &Path, mut on_item: F) -> Result<u64>
where
    R: BufRead,
    F: FnMut(&str) -> Result<()>,
{
    let mut buf = Vec::with_capacity(256);
    let mut line_no = 0u64;
    let mut items = 0u64;
    loop {
        buf.clear();
        let n = rdr
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("read line {} in {}", line_no + 1, path.display()))?;
        if n == 0 {
            break;
        }
        line_no += 1;
        let mut line = buf.as_slice();
        if let Some(rest) = line.strip_suffix(b"\n") {
            line = rest;
        }
        if let Some(rest) = line.strip_suffix(b"\r") {
            line = rest;
        }
        if line.is_empty() {
            continue;
        }
        let item = std::str::from_utf8(line)
            .with_context(|| format!("line {line_no} in {} is not valid UTF-8", path.display()))?;
        on_item(item)?;
        items += 1;
    }
    Ok(items)
}
