//! Synthetic URL streams with known frequencies.
//!
//! Every generator is deterministic (a fixed-seed LCG), so a test that fails
//! fails the same way every time.

use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::Path;

const URL_PREFIXES: [&str; 3] = [
    "github.com/username/topn-go/issues",
    "github.com/username/topn-go/pull",
    "github.com/username/topn-go",
];

/// A URL-shaped item, unique per `i`.
#[must_use]
pub fn url_like(i: usize) -> String {
    format!("{}/{i}", URL_PREFIXES[i % URL_PREFIXES.len()])
}

/// Linear congruential generator with the classic `rand()` parameters.
#[derive(Clone, Debug)]
pub struct Lcg {
    seed: u32,
}

impl Lcg {
    #[must_use]
    pub const fn new(seed: u32) -> Self {
        Self { seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.seed = self.seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        self.seed / 65_536
    }

    /// Uniform in `[0, bound)`; `bound` must be non-zero.
    pub fn next_below(&mut self, bound: usize) -> usize {
        (self.next_u32() as usize) % bound
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32() % 32_768) / 32_768.0
    }
}

/// A generated input stream and the exact frequency of every item in it.
#[derive(Clone, Debug, Default)]
pub struct GeneratedCase {
    pub lines: Vec<String>,
    pub counts: HashMap<String, u64>,
}

impl GeneratedCase {
    fn push(&mut self, item: &str) {
        *self.counts.entry(item.to_owned()).or_insert(0) += 1;
        self.lines.push(item.to_owned());
    }

    /// Append another case's lines and counts.
    #[must_use]
    pub fn chain(mut self, other: Self) -> Self {
        for (k, v) in other.counts {
            *self.counts.entry(k).or_insert(0) += v;
        }
        self.lines.extend(other.lines);
        self
    }

    /// Write the lines to `path`, one per line.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        write_lines(path, &self.lines)
    }
}

/// `records` draws, uniformly over `cardinality` distinct URLs.
#[must_use]
pub fn uniform_case(cardinality: usize, records: usize, seed: u32) -> GeneratedCase {
    let urls: Vec<String> = (0..cardinality.max(1)).map(url_like).collect();
    let mut rng = Lcg::new(seed);
    let mut case = GeneratedCase::default();
    for _ in 0..records {
        case.push(&urls[rng.next_below(urls.len())]);
    }
    case
}

/// `records` copies of a single URL.
#[must_use]
pub fn single_case(records: usize) -> GeneratedCase {
    let url = url_like(0);
    let mut case = GeneratedCase::default();
    for _ in 0..records {
        case.push(&url);
    }
    case
}

/// A skewed stream over `cardinality` URLs: URL `i` is drawn with
/// probability `head[i]` for the listed prefix, and the remaining mass is
/// spread evenly over the other URLs.
///
/// # Errors
/// Returns an error if `cardinality` is zero, or `head` sums past 1 or is
/// longer than `cardinality`.
pub fn skewed_case(
    cardinality: usize,
    head: &[f64],
    records: usize,
    seed: u32,
) -> Result<GeneratedCase> {
    let head_sum: f64 = head.iter().sum();
    if cardinality == 0 || head_sum > 1.0 || head.len() > cardinality {
        bail!("invalid head distribution {head:?} for cardinality {cardinality}");
    }
    let tail = cardinality - head.len();
    let rest = if tail == 0 {
        0.0
    } else {
        (1.0 - head_sum) / tail as f64
    };
    let mut cumulative = Vec::with_capacity(cardinality);
    let mut acc = 0.0;
    for i in 0..cardinality {
        acc += head.get(i).copied().unwrap_or(rest);
        cumulative.push(acc);
    }

    let urls: Vec<String> = (0..cardinality).map(url_like).collect();
    let mut rng = Lcg::new(seed);
    let mut case = GeneratedCase::default();
    for _ in 0..records {
        let x = rng.next_f64();
        let idx = cumulative
            .partition_point(|&c| c <= x)
            .min(cardinality - 1);
        case.push(&urls[idx]);
    }
    Ok(case)
}

/// Write `lines` to `path`, one per line, creating parent directories.
///
/// # Errors
/// Returns an error if the file or its directory cannot be created or written.
pub fn write_lines<S: AsRef<str>>(path: impl AsRef<Path>, lines: &[S]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for line in lines {
        writeln!(w, "{}", line.as_ref())?;
    }
    w.flush()?;
    Ok(())
}
