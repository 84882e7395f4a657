//! Per-metric summary and verdict decision.

use serde::{Deserialize, Serialize};

use crate::descriptive::{DescriptiveStats, describe, mean};
use crate::paired::{PairedTestKind, TestOutcome, cohens_d, paired_t_test, wilcoxon_signed_rank};

/// Outcome of a significance decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Significant,
    NotSignificant,
    InsufficientData,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Significant => "significant",
            Self::NotSignificant => "not_significant",
            Self::InsufficientData => "insufficient_data",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Thresholds for the verdict decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificanceConfig {
    /// p-values strictly below this are significant
    pub alpha: f64,
    /// Pairs required before the t-test decides the verdict;
    /// smaller samples are decided by the Wilcoxon test
    pub min_t_test_samples: usize,
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            min_t_test_samples: 8,
        }
    }
}

/// Paired comparison of one metric across a suite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSummary {
    pub metric_name: String,
    /// Usable pairs (both sides succeeded, both values finite)
    pub pairs: usize,
    /// Pairs dropped because either side was unusable
    pub excluded_pairs: usize,
    pub baseline_stats: Option<DescriptiveStats>,
    pub variant_stats: Option<DescriptiveStats>,
    /// Mean of `variant - baseline`
    pub mean_difference: Option<f64>,
    /// Test that decided the verdict
    pub paired_test_kind: Option<PairedTestKind>,
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
    /// Cohen's d on the paired differences; positive when the variant is higher
    pub effect_size: Option<f64>,
    pub t_test: Option<TestOutcome>,
    pub wilcoxon: Option<TestOutcome>,
    pub verdict: Verdict,
}

impl StatSummary {
    fn insufficient(metric_name: &str, pairs: usize, excluded_pairs: usize) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            pairs,
            excluded_pairs,
            baseline_stats: None,
            variant_stats: None,
            mean_difference: None,
            paired_test_kind: None,
            statistic: None,
            p_value: None,
            effect_size: None,
            t_test: None,
            wilcoxon: None,
            verdict: Verdict::InsufficientData,
        }
    }

    /// The outcome that decided the verdict, if any
    pub fn deciding_test(&self) -> Option<&TestOutcome> {
        match self.paired_test_kind? {
            PairedTestKind::PairedT => self.t_test.as_ref(),
            PairedTestKind::WilcoxonSignedRank => self.wilcoxon.as_ref(),
        }
    }
}

/// Summarize `(baseline, variant)` pairs for one metric.
///
/// Pairs with a non-finite value are counted as excluded. `excluded_pairs`
/// is added to that count for pairs the caller already dropped.
pub fn summarize_pairs(
    metric_name: &str,
    pairs: &[(f64, f64)],
    excluded_pairs: usize,
    config: &SignificanceConfig,
) -> StatSummary {
    let usable: Vec<(f64, f64)> = pairs
        .iter()
        .copied()
        .filter(|(b, v)| b.is_finite() && v.is_finite())
        .collect();
    let excluded = excluded_pairs + (pairs.len() - usable.len());
    let n = usable.len();

    if n < 2 {
        return StatSummary::insufficient(metric_name, n, excluded);
    }

    let baseline: Vec<f64> = usable.iter().map(|(b, _)| *b).collect();
    let variant: Vec<f64> = usable.iter().map(|(_, v)| *v).collect();
    let diffs: Vec<f64> = usable.iter().map(|(b, v)| v - b).collect();

    let mut summary = StatSummary::insufficient(metric_name, n, excluded);
    summary.baseline_stats = describe(&baseline);
    summary.variant_stats = describe(&variant);
    summary.mean_difference = mean(&diffs);
    summary.t_test = paired_t_test(&diffs);
    summary.wilcoxon = wilcoxon_signed_rank(&diffs);
    summary.effect_size = cohens_d(&diffs);

    // Zero-variance differences leave the t statistic undefined.
    let Some(t_test) = summary.t_test else {
        return summary;
    };

    let deciding = if n >= config.min_t_test_samples {
        Some(t_test)
    } else {
        summary.wilcoxon
    };
    if let Some(outcome) = deciding {
        summary.paired_test_kind = Some(outcome.kind);
        summary.statistic = Some(outcome.statistic);
        summary.p_value = Some(outcome.p_value);
        summary.verdict = if outcome.p_value < config.alpha {
            Verdict::Significant
        } else {
            Verdict::NotSignificant
        };
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(baseline: &[f64], variant: &[f64]) -> Vec<(f64, f64)> {
        baseline.iter().copied().zip(variant.iter().copied()).collect()
    }

    #[test]
    fn test_single_pair_is_insufficient() {
        let summary = summarize_pairs(
            "latency_ms",
            &pairs(&[100.0], &[140.0]),
            0,
            &SignificanceConfig::default(),
        );
        assert_eq!(summary.verdict, Verdict::InsufficientData);
        assert_eq!(summary.p_value, None);
        assert_eq!(summary.statistic, None);
        assert_eq!(summary.effect_size, None);
        assert_eq!(summary.baseline_stats, None);
        assert_eq!(summary.pairs, 1);
    }

    #[test]
    fn test_three_pair_latency_scenario() {
        let input = pairs(&[100.0, 120.0, 110.0], &[140.0, 130.0, 150.0]);
        let summary = summarize_pairs("latency_ms", &input, 0, &SignificanceConfig::default());

        assert_eq!(summary.mean_difference, Some(30.0));
        let d = summary.effect_size.unwrap();
        assert!(d > 0.0);
        assert!((d - 3.0_f64.sqrt()).abs() < 1e-12);

        // Below the t-test minimum the Wilcoxon test decides
        assert_eq!(summary.paired_test_kind, Some(PairedTestKind::WilcoxonSignedRank));
        assert!((summary.p_value.unwrap() - 0.25).abs() < 1e-12);
        assert_eq!(summary.verdict, Verdict::NotSignificant);
        assert!(summary.t_test.is_some());

        let again = summarize_pairs("latency_ms", &input, 0, &SignificanceConfig::default());
        assert_eq!(summary, again);
    }

    #[test]
    fn test_zero_variance_differences_are_insufficient() {
        let input = pairs(&[10.0, 20.0, 30.0], &[10.0, 20.0, 30.0]);
        let summary = summarize_pairs("prompt_tokens", &input, 0, &SignificanceConfig::default());
        assert_eq!(summary.verdict, Verdict::InsufficientData);
        assert_eq!(summary.effect_size, None);
        assert_eq!(summary.t_test, None);
        assert_eq!(summary.wilcoxon, None);
        assert_eq!(summary.mean_difference, Some(0.0));

        // Constant non-zero shift: Wilcoxon is defined, t is not
        let input = pairs(&[10.0, 20.0, 30.0], &[15.0, 25.0, 35.0]);
        let summary = summarize_pairs("prompt_tokens", &input, 0, &SignificanceConfig::default());
        assert_eq!(summary.verdict, Verdict::InsufficientData);
        assert_eq!(summary.p_value, None);
        assert!(summary.wilcoxon.is_some());
    }

    #[test]
    fn test_identical_fractional_diffs_are_insufficient() {
        let input = vec![(0.0, 0.1); 10];
        let summary = summarize_pairs("score", &input, 0, &SignificanceConfig::default());
        assert_eq!(summary.verdict, Verdict::InsufficientData);
        assert_eq!(summary.t_test, None);
        assert_eq!(summary.effect_size, None);
        assert_eq!(summary.p_value, None);
    }

    #[test]
    fn test_large_consistent_shift_is_significant_by_t_test() {
        let baseline = [100.0, 102.0, 98.0, 101.0, 99.0, 103.0, 97.0, 100.0, 101.0, 99.0];
        let diffs = [5.0, 7.0, 3.0, 9.0, 4.0, 6.0, 8.0, 2.0, 10.0, 6.0];
        let variant: Vec<f64> = baseline.iter().zip(diffs).map(|(b, d)| b + d).collect();
        let summary = summarize_pairs(
            "completion_tokens",
            &pairs(&baseline, &variant),
            0,
            &SignificanceConfig::default(),
        );
        assert_eq!(summary.paired_test_kind, Some(PairedTestKind::PairedT));
        assert!((summary.statistic.unwrap() - 7.348_469_228).abs() < 1e-6);
        assert!(summary.p_value.unwrap() < 1e-4);
        assert_eq!(summary.verdict, Verdict::Significant);
        assert_eq!(summary.deciding_test(), summary.t_test.as_ref());
        let wilcoxon = summary.wilcoxon.unwrap();
        assert!((wilcoxon.p_value - 2.0 / 1024.0).abs() < 1e-12);
    }

    #[test]
    fn test_custom_threshold_changes_verdict() {
        let input = pairs(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2.0, 3.0, 4.0, 5.0, 6.0, 8.0]);
        let strict = SignificanceConfig {
            alpha: 0.01,
            min_t_test_samples: 8,
        };
        let loose = SignificanceConfig {
            alpha: 0.05,
            min_t_test_samples: 8,
        };
        // Wilcoxon exact p = 2/64
        assert_eq!(summarize_pairs("m", &input, 0, &strict).verdict, Verdict::NotSignificant);
        assert_eq!(summarize_pairs("m", &input, 0, &loose).verdict, Verdict::Significant);
    }

    #[test]
    fn test_non_finite_pairs_are_excluded() {
        let input = vec![(1.0, 2.0), (f64::NAN, 3.0), (2.0, 4.0), (3.0, 7.0)];
        let summary = summarize_pairs("m", &input, 2, &SignificanceConfig::default());
        assert_eq!(summary.pairs, 3);
        assert_eq!(summary.excluded_pairs, 3);
    }

    #[test]
    fn test_summary_serializes_verdict_snake_case() {
        let summary = summarize_pairs("m", &[], 0, &SignificanceConfig::default());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["verdict"], "insufficient_data");
        assert!(json["p_value"].is_null());
    }
}
