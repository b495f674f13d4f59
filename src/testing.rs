//! Testing utilities for top-N runs.
//!
//! - **Builders**: deterministic synthetic URL streams with known frequencies
//!   ([`uniform_case`], [`single_case`], [`skewed_case`]) and [`write_lines`]
//! - **Assertions**: an independent ground-truth ranking
//!   ([`ground_truth_top_n`]) and result-file checks ([`assert_result_file`],
//!   [`files_equal`])
//!
//! # Quick Start
//!
//! ```no_run
//! use topn::testing::*;
//! use topn::{TopN, TopNConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let dir = tempfile::TempDir::new()?;
//! let case = skewed_case(100, &[0.5, 0.3], 10_000, 7)?;
//! case.write_to(dir.path().join("input"))?;
//!
//! TopN::new(TopNConfig::default().with_n(5).with_partitions(8)).run(
//!     dir.path().join("input"),
//!     dir.path().join("result"),
//!     dir.path().join("tmp"),
//! )?;
//!
//! let expected = format_result_lines(&ground_truth_top_n(&case.counts, 5));
//! assert_result_file(dir.path().join("result"), &expected);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod builders;

pub use assertions::*;
pub use builders::*;
