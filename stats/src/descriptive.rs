//! Descriptive statistics over a single sample.

use serde::{Deserialize, Serialize};

/// Central tendency and spread of one side of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveStats {
    /// Number of samples
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (n - 1 denominator); 0.0 for a single sample
    pub std_dev: f64,
}

/// Summarize a sample. Returns `None` for an empty slice.
pub fn describe(samples: &[f64]) -> Option<DescriptiveStats> {
    Some(DescriptiveStats {
        n: samples.len(),
        mean: mean(samples)?,
        median: median(samples)?,
        std_dev: sample_std_dev(samples).unwrap_or(0.0),
    })
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Median; the mean of the two middle values for even lengths.
pub fn median(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Unbiased sample standard deviation, `None` with fewer than 2 samples.
pub fn sample_std_dev(samples: &[f64]) -> Option<f64> {
    let n = samples.len();
    if n < 2 {
        return None;
    }
    let m = mean(samples)?;
    let sum_sq: f64 = samples.iter().map(|x| (x - m) * (x - m)).sum();
    Some((sum_sq / (n as f64 - 1.0)).sqrt())
}
