//! Merge per-partition heaps into the global top-N and write the result file.
//!
//! Partitions are disjoint: every item lives in exactly one partition. The
//! global top-N is therefore a subset of the union of the per-partition
//! top-N sets, and merging those bounded heaps loses nothing.

use crate::heap::TopKHeap;
use crate::record::UrlCount;
use anyhow::{Context, Result};
use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Push every occupied slot of every heap into one fresh heap of capacity `n`.
#[must_use]
pub fn merge_heaps<'a, I>(heaps: I, n: usize) -> TopKHeap
where
    I: IntoIterator<Item = &'a TopKHeap>,
{
    let mut merged = TopKHeap::new(n);
    for heap in heaps {
        merged.merge_from(heap);
    }
    merged
}

/// Conventional result path: `<dir>/top-<n>-result`.
///
/// `dir` must not be the run's work directory, which is cleared by every run.
#[must_use]
pub fn result_file_name(dir: impl AsRef<Path>, n: usize) -> PathBuf {
    dir.as_ref().join(format!("top-{n}-result"))
}

/// Write ranked records as `<item>: <count>` lines, most frequent first.
///
/// The file is truncated if it exists; parent directories are created as
/// needed. Returns the number of lines written.
///
/// # Errors
/// Returns an error if the file or its directory cannot be created or written.
pub fn write_result(path: impl AsRef<Path>, ranked: &[UrlCount]) -> Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for record in ranked {
        writeln!(w, "{record}").with_context(|| format!("write {}", path.display()))?;
    }
    w.flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(ranked.len())
}
