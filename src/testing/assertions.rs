//! Ground-truth rankings and result-file assertions.

use crate::record::UrlCount;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// Exact frequency of every line in `lines`, counted in memory.
#[must_use]
pub fn count_lines<'a, I>(lines: I) -> HashMap<String, u64>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts = HashMap::new();
    for line in lines {
        *counts.entry(line.to_owned()).or_insert(0) += 1;
    }
    counts
}

/// The top `n` of `counts` by full sort, independent of the heap.
#[must_use]
pub fn ground_truth_top_n(counts: &HashMap<String, u64>, n: usize) -> Vec<UrlCount> {
    let mut all: Vec<UrlCount> = counts
        .iter()
        .map(|(k, v)| UrlCount::new(k.clone(), *v))
        .collect();
    all.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.url.cmp(&b.url)));
    all.truncate(n);
    all
}

/// Render ranked records the way the result file does.
#[must_use]
pub fn format_result_lines(ranked: &[UrlCount]) -> Vec<String> {
    ranked.iter().map(ToString::to_string).collect()
}

/// Lines of a result file, without line terminators.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_result_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let text =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(text.lines().map(str::to_owned).collect())
}

/// Assert that the result file at `path` holds exactly `expected`, in order.
///
/// # Panics
/// Panics if the file cannot be read or its lines differ from `expected`.
pub fn assert_result_file<S: AsRef<str>>(path: impl AsRef<Path>, expected: &[S]) {
    let path = path.as_ref();
    let actual = read_result_lines(path)
        .unwrap_or_else(|e| panic!("cannot read result file {}: {e:#}", path.display()));
    let expected: Vec<&str> = expected.iter().map(AsRef::as_ref).collect();
    assert_eq!(
        actual,
        expected,
        "Result file mismatch in {}:\n  Expected: {expected:?}\n  Actual: {actual:?}",
        path.display()
    );
}

/// Whole-file comparison, ignoring leading and trailing whitespace.
///
/// # Errors
/// Returns an error if either file cannot be read.
pub fn files_equal(a: impl AsRef<Path>, b: impl AsRef<Path>) -> Result<bool> {
    let (a, b) = (a.as_ref(), b.as_ref());
    let ca = std::fs::read_to_string(a).with_context(|| format!("read {}", a.display()))?;
    let cb = std::fs::read_to_string(b).with_context(|| format!("read {}", b.display()))?;
    Ok(ca.trim() == cb.trim())
}

/// Whether anything exists at `p`. A missing path is an ordinary `false`.
#[must_use]
pub fn path_exists(p: impl AsRef<Path>) -> bool {
    p.as_ref().exists()
}
