//! NaN-aware image statistics
//!
//! `min`, `max` and `rms` (population standard deviation, ddof = 0) over the
//! non-NaN samples of an image. An image with no valid samples yields NaN for
//! all three; that is a normal result, not an error.
//!
//! Two backends compute identical results:
//! - [`Backend::Scalar`]: two passes in `f64`
//! - [`Backend::Simd`]: trueno SIMD min/max (AVX-512/AVX2/SSE2 auto-detect)
//!   for samples exactly representable as `f32`, scalar `f64` moments

use serde::{Deserialize, Serialize};
use std::fmt;
use trueno::Vector;

/// Reduction backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Portable scalar reductions
    Scalar,
    /// trueno SIMD min/max with scalar fallback
    #[default]
    Simd,
}

/// `{min, max, rms}` of an image, NaN where undefined
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsResult {
    min: f64,
    max: f64,
    rms: f64,
}

impl StatsResult {
    /// Build a result from explicit values
    #[must_use]
    pub const fn new(min: f64, max: f64, rms: f64) -> Self {
        Self { min, max, rms }
    }

    /// All-NaN result (no valid samples)
    #[must_use]
    pub const fn undefined() -> Self {
        Self::new(f64::NAN, f64::NAN, f64::NAN)
    }

    /// Minimum valid sample
    #[must_use]
    pub const fn min(&self) -> f64 {
        self.min
    }

    /// Maximum valid sample
    #[must_use]
    pub const fn max(&self) -> f64 {
        self.max
    }

    /// Standard deviation of valid samples
    #[must_use]
    pub const fn rms(&self) -> f64 {
        self.rms
    }

    /// True when every statistic is NaN
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        self.min.is_nan() && self.max.is_nan() && self.rms.is_nan()
    }

    /// `[min, max, rms]`
    #[must_use]
    pub const fn to_array(&self) -> [f64; 3] {
        [self.min, self.max, self.rms]
    }

    /// Compare within `tolerance`, treating NaN as equal to NaN
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .all(|(a, b)| (a.is_nan() && b.is_nan()) || (a - b).abs() <= tolerance)
    }
}

impl From<StatsResult> for [f64; 3] {
    fn from(stats: StatsResult) -> Self {
        stats.to_array()
    }
}

impl fmt::Display for StatsResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "min={} max={} rms={}", self.min, self.max, self.rms)
    }
}

/// Compute statistics over `samples`, skipping NaN.
#[must_use]
pub fn summarize(samples: &[f64], backend: Backend) -> StatsResult {
    match backend {
        Backend::Scalar => summarize_scalar(samples),
        Backend::Simd => summarize_simd(samples),
    }
}

fn valid(samples: &[f64]) -> impl Iterator<Item = f64> + '_ {
    samples.iter().copied().filter(|x| !x.is_nan())
}

/// Mean and population standard deviation, two passes
#[allow(clippy::cast_precision_loss)]
fn moments(samples: &[f64], count: usize) -> (f64, f64) {
    let n = count as f64;
    let mean = valid(samples).sum::<f64>() / n;
    let variance = valid(samples).map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

fn summarize_scalar(samples: &[f64]) -> StatsResult {
    let (count, min, max) = valid(samples).fold(
        (0usize, f64::INFINITY, f64::NEG_INFINITY),
        |(count, min, max), x| (count + 1, min.min(x), max.max(x)),
    );
    if count == 0 {
        return StatsResult::undefined();
    }
    let (_, rms) = moments(samples, count);
    StatsResult::new(min, max, rms)
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn summarize_simd(samples: &[f64]) -> StatsResult {
    // Lossless narrowing only: SIMD min/max must match the scalar backend exactly
    let mut lanes = Vec::with_capacity(samples.len());
    for x in valid(samples) {
        let narrowed = x as f32;
        if !x.is_finite() || f64::from(narrowed) != x {
            return summarize_scalar(samples);
        }
        lanes.push(narrowed);
    }
    if lanes.is_empty() {
        return StatsResult::undefined();
    }

    let vector = Vector::from_slice(&lanes);
    match (vector.min(), vector.max()) {
        (Ok(min), Ok(max)) => {
            let (_, rms) = moments(samples, lanes.len());
            StatsResult::new(f64::from(min), f64::from(max), rms)
        }
        _ => summarize_scalar(samples),
    }
}
