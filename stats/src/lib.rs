//! Paired statistics for A/B agent comparisons
//!
//! Pure numeric building blocks used to decide whether a variant agent
//! differs from a baseline agent on a suite of paired trials.
//!
//! Key concepts:
//! - `DescriptiveStats`: mean, median and sample standard deviation of one side
//! - `TestOutcome`: statistic and two-sided p-value of one paired test
//! - `StatSummary`: everything known about one metric, plus a `Verdict`
//!
//! Tests computed for every metric:
//! - Paired t-test on the differences (`variant - baseline`)
//! - Wilcoxon signed-rank test (exact for small samples)
//! - Cohen's d on the paired differences
//!
//! Degenerate inputs never produce NaN or infinity: they surface as
//! `Verdict::InsufficientData` with the affected numeric fields unset.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod descriptive;
pub mod paired;
pub mod special;
pub mod summary;

pub use descriptive::{DescriptiveStats, describe, mean, median, sample_std_dev};
pub use paired::{
    PValueMethod, PairedTestKind, TestOutcome, cohens_d, paired_t_test, wilcoxon_signed_rank,
};
pub use summary::{SignificanceConfig, StatSummary, Verdict, summarize_pairs};
