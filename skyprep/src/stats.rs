//! Outlier-resistant statistics over pixel samples.
//!
//! The central entry point is [`calc_stat`]: iterative sigma clipping followed
//! by one of several location/scale estimators. It mirrors the sky-background
//! and SNR calculations interactive viewers run over user-selected regions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for statistic configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("{0:?} is not a valid estimator (expected mean, median, mode, or stddev)")]
    InvalidEstimator(String),
}

/// Statistic computed after sigma clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Estimator {
    /// Arithmetic mean of the retained sample.
    Mean,
    /// Median of the retained sample.
    Median,
    /// Biweight location: a smooth, outlier-down-weighted peak estimate,
    /// not the most-frequent-value mode.
    Mode,
    /// Population standard deviation (ddof = 0) of the retained sample.
    Stddev,
}

impl FromStr for Estimator {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            "mode" => Ok(Self::Mode),
            "stddev" => Ok(Self::Stddev),
            other => Err(StatsError::InvalidEstimator(other.to_string())),
        }
    }
}

impl fmt::Display for Estimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Mode => "mode",
            Self::Stddev => "stddev",
        };
        f.write_str(name)
    }
}

/// Configuration for [`calc_stat`].
///
/// `sigma` must be positive; a non-positive value clips away the whole sample
/// and the result degenerates to 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatConfig {
    /// Clip threshold in units of the sample's standard deviation.
    pub sigma: f64,
    /// Maximum number of clipping passes.
    pub max_iters: usize,
    /// Statistic computed over the retained sample.
    pub estimator: Estimator,
}

impl Default for StatConfig {
    fn default() -> Self {
        Self {
            sigma: 1.8,
            max_iters: 10,
            estimator: Estimator::Median,
        }
    }
}

/// Compute a sigma-clipped statistic over a sample.
///
/// Returns 0.0 for an empty sample, and 0.0 when clipping rejects everything;
/// callers treat "no data" as "no signal" rather than an error. The result is
/// fully deterministic for a given sample and configuration.
pub fn calc_stat(sample: &[f64], config: &StatConfig) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }

    let kept = sigma_clip(sample, config.sigma, config.max_iters);
    if kept.is_empty() {
        return 0.0;
    }

    match config.estimator {
        Estimator::Mean => mean(&kept),
        Estimator::Median => median(&kept),
        Estimator::Mode => biweight_location(&kept),
        Estimator::Stddev => std_dev(&kept),
    }
}

/// Iteratively reject outliers beyond `sigma` standard deviations.
///
/// Each pass centers on the median and measures spread with the population
/// standard deviation, then discards samples farther than `sigma` spreads from
/// center. Iteration stops early once a pass rejects nothing.
pub fn sigma_clip(sample: &[f64], sigma: f64, max_iters: usize) -> Vec<f64> {
    let mut kept = sample.to_vec();

    for _ in 0..max_iters {
        if kept.is_empty() {
            break;
        }
        let center = median(&kept);
        let spread = std_dev(&kept);
        let before = kept.len();
        kept.retain(|&x| (x - center).abs() <= sigma * spread);
        if kept.len() == before {
            break;
        }
    }

    kept
}

/// Biweight location estimate of a sample's central value.
///
/// Down-weights points far from the median by `(1 - u^2)^2` with the customary
/// tuning constant of 6 MADs, rather than discarding them outright. Falls back
/// to the plain median when the MAD is zero.
pub fn biweight_location(sample: &[f64]) -> f64 {
    let m = median(sample);
    let deviations: Vec<f64> = sample.iter().map(|x| (x - m).abs()).collect();
    let mad = median(&deviations);
    if mad == 0.0 {
        return m;
    }

    let c = 6.0;
    let mut num = 0.0;
    let mut den = 0.0;
    for &x in sample {
        let u = (x - m) / (c * mad);
        let u2 = u * u;
        if u2 < 1.0 {
            let w = (1.0 - u2) * (1.0 - u2);
            num += (x - m) * w;
            den += w;
        }
    }

    if den == 0.0 {
        m
    } else {
        m + num / den
    }
}

fn mean(sample: &[f64]) -> f64 {
    sample.iter().sum::<f64>() / sample.len() as f64
}

/// Population standard deviation (ddof = 0).
fn std_dev(sample: &[f64]) -> f64 {
    let m = mean(sample);
    let var = sample.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / sample.len() as f64;
    var.sqrt()
}

fn median(sample: &[f64]) -> f64 {
    let mut sorted = sample.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}
