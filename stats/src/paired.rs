//! Paired difference tests and effect size.
//!
//! All functions take the paired differences `variant - baseline`.

use serde::{Deserialize, Serialize};

use crate::descriptive::{mean, sample_std_dev};
use crate::special::{normal_cdf, student_t_two_sided_p};

/// Largest number of non-zero differences for which the Wilcoxon
/// p-value is computed from the exact sign-flip distribution.
pub const WILCOXON_EXACT_LIMIT: usize = 50;

/// Which paired test produced an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairedTestKind {
    PairedT,
    WilcoxonSignedRank,
}

impl PairedTestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PairedT => "paired_t",
            Self::WilcoxonSignedRank => "wilcoxon_signed_rank",
        }
    }
}

impl std::fmt::Display for PairedTestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a p-value was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PValueMethod {
    /// Student's t distribution with n - 1 degrees of freedom
    StudentT,
    /// Exact enumeration of all sign assignments
    Exact,
    /// Normal approximation with tie and continuity correction
    NormalApproximation,
}

/// Result of one paired significance test
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub kind: PairedTestKind,
    /// t for the t-test, `min(W+, W-)` for Wilcoxon
    pub statistic: f64,
    /// Two-sided p-value
    pub p_value: f64,
    /// Differences that entered the test (Wilcoxon drops zeros)
    pub sample_size: usize,
    pub method: PValueMethod,
}

/// Paired t-test on the differences.
///
/// Returns `None` with fewer than 2 differences or when every difference
/// is identical (the t statistic would be undefined).
pub fn paired_t_test(diffs: &[f64]) -> Option<TestOutcome> {
    let n = diffs.len();
    let sd = sample_std_dev(diffs)?;
    if negligible_spread(sd, diffs) {
        return None;
    }
    let t = mean(diffs)? / (sd / (n as f64).sqrt());
    Some(TestOutcome {
        kind: PairedTestKind::PairedT,
        statistic: t,
        p_value: student_t_two_sided_p(t, n as f64 - 1.0),
        sample_size: n,
        method: PValueMethod::StudentT,
    })
}

/// Cohen's d on paired differences: `mean(diff) / stdev(diff)`.
///
/// `None` when fewer than 2 differences or zero variance.
pub fn cohens_d(diffs: &[f64]) -> Option<f64> {
    let sd = sample_std_dev(diffs)?;
    if negligible_spread(sd, diffs) {
        return None;
    }
    Some(mean(diffs)? / sd)
}

/// True when `sd` is indistinguishable from rounding noise at the scale of
/// `diffs`, so identical differences count as zero variance.
fn negligible_spread(sd: f64, diffs: &[f64]) -> bool {
    let scale = diffs.iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));
    !sd.is_finite() || sd <= 8.0 * f64::EPSILON * scale
}

/// Wilcoxon signed-rank test.
///
/// Zero differences are dropped and tied magnitudes share their average
/// rank. Returns `None` when no non-zero difference remains.
pub fn wilcoxon_signed_rank(diffs: &[f64]) -> Option<TestOutcome> {
    let mut nonzero: Vec<f64> = diffs.iter().copied().filter(|d| *d != 0.0).collect();
    let n = nonzero.len();
    if n == 0 {
        return None;
    }
    nonzero.sort_by(|a, b| a.abs().total_cmp(&b.abs()));

    // Ranks are doubled so tied (x.5) ranks stay integral.
    let mut doubled_ranks = vec![0u64; n];
    let mut tie_groups = Vec::new();
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && nonzero[j + 1].abs() == nonzero[i].abs() {
            j += 1;
        }
        // Average of ranks (i+1)..=(j+1), doubled
        let doubled = (i + 1 + j + 1) as u64;
        for rank in &mut doubled_ranks[i..=j] {
            *rank = doubled;
        }
        tie_groups.push(j - i + 1);
        i = j + 1;
    }

    let doubled_positive: u64 = nonzero
        .iter()
        .zip(&doubled_ranks)
        .filter(|(d, _)| **d > 0.0)
        .map(|(_, r)| *r)
        .sum();
    let doubled_total: u64 = doubled_ranks.iter().sum();
    let doubled_w = doubled_positive.min(doubled_total - doubled_positive);
    let statistic = doubled_w as f64 / 2.0;

    let (p_value, method) = if n <= WILCOXON_EXACT_LIMIT {
        (exact_signed_rank_p(&doubled_ranks, doubled_w), PValueMethod::Exact)
    } else {
        (
            normal_signed_rank_p(n, statistic, &tie_groups)?,
            PValueMethod::NormalApproximation,
        )
    };

    Some(TestOutcome {
        kind: PairedTestKind::WilcoxonSignedRank,
        statistic,
        p_value,
        sample_size: n,
        method,
    })
}

/// Two-sided exact p-value: `2 * P(S <= w)` over all `2^n` sign flips.
fn exact_signed_rank_p(doubled_ranks: &[u64], doubled_w: u64) -> f64 {
    let total: u64 = doubled_ranks.iter().sum();
    let mut counts = vec![0.0_f64; total as usize + 1];
    counts[0] = 1.0;
    let mut reach = 0usize;
    for &rank in doubled_ranks {
        let rank = rank as usize;
        for s in (0..=reach).rev() {
            if counts[s] != 0.0 {
                counts[s + rank] += counts[s];
            }
        }
        reach += rank;
    }
    let assignments = 2.0_f64.powi(doubled_ranks.len() as i32);
    let tail: f64 = counts[..=doubled_w as usize].iter().sum();
    (2.0 * tail / assignments).min(1.0)
}

fn normal_signed_rank_p(n: usize, w: f64, tie_groups: &[usize]) -> Option<f64> {
    let n = n as f64;
    let expected = n * (n + 1.0) / 4.0;
    let tie_correction: f64 = tie_groups
        .iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum::<f64>()
        / 48.0;
    let variance = n * (n + 1.0) * (2.0 * n + 1.0) / 24.0 - tie_correction;
    if variance <= 0.0 {
        return None;
    }
    let deviation = ((w - expected).abs() - 0.5).max(0.0);
    let z = deviation / variance.sqrt();
    Some((2.0 * normal_cdf(-z)).min(1.0))
}
