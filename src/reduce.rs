//! The body of a reduce task: one partition file in, one top-K heap out.

use crate::heap::TopKHeap;
use crate::io::partition::{PartitionFile, SpillCodec};
use crate::record::UrlCount;
use anyhow::Result;
use tracing::debug;

/// A unit of reduce work: turn one partition file into that partition's heap.
#[derive(Debug)]
pub struct ReduceTask {
    pub file: PartitionFile,
    pub codec: SpillCodec,
    /// Target heap; its capacity is the `n` of the run.
    pub heap: TopKHeap,
}

impl ReduceTask {
    #[must_use]
    pub fn new(file: PartitionFile, codec: SpillCodec, n: usize) -> Self {
        Self {
            file,
            codec,
            heap: TopKHeap::new(n),
        }
    }

    #[must_use]
    pub fn partition(&self) -> usize {
        self.file.id()
    }
}

/// What a finished reduce task hands back to the driver.
#[derive(Debug)]
pub struct ReduceOutcome {
    pub partition: usize,
    pub heap: TopKHeap,
    /// Count records decoded from the partition file, across all spills.
    pub records_read: u64,
    /// Distinct items after summing spills.
    pub distinct_items: u64,
}

/// Rebuild the partition's frequency table from every spilled record,
/// offer each `(item, total)` to the task's heap, then delete the file.
///
/// The file is only removed after it has been read completely, so a failed
/// task leaves it intact.
///
/// # Errors
/// Returns an error if the partition file is missing, unreadable or
/// corrupt, or cannot be removed.
pub fn reduce_partition(task: ReduceTask) -> Result<ReduceOutcome> {
    let ReduceTask {
        file,
        codec,
        mut heap,
    } = task;
    let partition = file.id();
    let (counts, records_read) = file.read_counts(&codec)?;
    let distinct_items = counts.len() as u64;
    heap.extend(counts.into_iter().map(UrlCount::from));
    file.remove()?;
    debug!(partition, records_read, distinct_items, kept = heap.len(), "reduced partition");
    Ok(ReduceOutcome {
        partition,
        heap,
        records_read,
        distinct_items,
    })
}
