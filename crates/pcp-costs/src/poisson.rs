// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::model::SegmentModel;
use pcp_core::{CountSeries, CpdError};
use std::convert::Infallible;

/// Poisson rate model for piecewise-constant count intensities.
///
/// Segment conventions use half-open intervals: `[start, end)`.
///
/// The segment log-likelihood uses the MLE rate and omits the per-observation
/// `-log(x_i!)` terms; those are independent of the segmentation and are
/// returned once by [`SegmentModel::log_likelihood_constant`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoissonRate;

impl PoissonRate {
    pub const fn new() -> Self {
        Self
    }
}

/// Number of `ln(j)` terms folded into the factorial constant between two
/// calls of the polling callback.
pub const LOG_FACTORIAL_POLL_CHUNK: u64 = 1 << 16;

/// Owned counts plus exact integer prefix sums.
///
/// Prefix sums give O(1) segment means. Log-likelihoods are summed over the
/// stored counts so the table sees the same value as
/// [`segment_log_likelihood`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoissonCache {
    counts: Vec<u64>,
    prefix_sum: Vec<u64>,
}

impl PoissonCache {
    /// Number of observations covered by the cache.
    pub fn n(&self) -> usize {
        self.counts.len()
    }

    /// Total count over `[start, end)`.
    pub fn segment_sum(&self, start: usize, end: usize) -> u64 {
        self.prefix_sum[end] - self.prefix_sum[start]
    }

    fn segment_mean(&self, start: usize, end: usize) -> f64 {
        self.segment_sum(start, end) as f64 / (end - start) as f64
    }
}

fn cache_overflow_err(n: usize) -> CpdError {
    CpdError::resource_limit(format!(
        "count total overflows u64 while building PoissonCache for n={n}"
    ))
}

fn check_segment(n: usize, start: usize, end: usize) -> Result<(), CpdError> {
    if start >= end {
        return Err(CpdError::invalid_input(format!(
            "segment requires start < end; got start={start}, end={end}"
        )));
    }
    if end > n {
        return Err(CpdError::invalid_input(format!(
            "segment end out of bounds: end={end}, n={n}"
        )));
    }
    Ok(())
}

// Walks the segment from its last observation back to its first. Zero counts
// contribute `-rate` so an all-zero segment is exactly zero.
fn accumulate_log_likelihood(segment: &[u64], rate: f64) -> f64 {
    let mut total = 0.0;
    for &count in segment.iter().rev() {
        if count == 0 {
            total -= rate;
        } else {
            total += count as f64 * rate.ln() - rate;
        }
    }
    total
}

fn fold_log_factorials<E>(
    counts: &[u64],
    poll: &mut dyn FnMut(usize) -> Result<(), E>,
) -> Result<f64, E> {
    let mut constant = 0.0;
    for &count in counts {
        let mut j = count;
        while j >= 2 {
            let stop = j.saturating_sub(LOG_FACTORIAL_POLL_CHUNK).max(1);
            poll((j - stop) as usize)?;
            while j > stop {
                constant -= (j as f64).ln();
                j -= 1;
            }
        }
    }
    Ok(constant)
}

/// Maximum-likelihood intensity of `[start, end)`: the mean count.
pub fn segment_mle(counts: &[u64], start: usize, end: usize) -> Result<f64, CpdError> {
    check_segment(counts.len(), start, end)?;
    let sum = counts[start..end]
        .iter()
        .try_fold(0u64, |acc, &count| acc.checked_add(count))
        .ok_or_else(|| {
            CpdError::resource_limit(format!(
                "count total overflows u64 over segment [{start}, {end})"
            ))
        })?;
    Ok(sum as f64 / (end - start) as f64)
}

/// Segmentation-dependent Poisson log-likelihood of `[start, end)`, summed
/// observation by observation from `end - 1` down to `start`.
///
/// Zero counts contribute `-m` so an all-zero segment (`m = 0`) is exactly
/// zero instead of evaluating `0 * ln(0)`.
pub fn segment_log_likelihood(counts: &[u64], start: usize, end: usize) -> Result<f64, CpdError> {
    let rate = segment_mle(counts, start, end)?;
    Ok(accumulate_log_likelihood(&counts[start..end], rate))
}

/// Factorial normalization `-sum_i ln(x_i!)`, accumulated as `-ln(j)` for
/// `j = x_i, x_i - 1, ..., 2`.
///
/// Runs in time proportional to the sum of the counts. Use
/// [`SegmentModel::log_likelihood_constant`] when the caller needs to poll
/// for cancellation along the way.
pub fn log_likelihood_constant(counts: &[u64]) -> f64 {
    let Ok(constant) = fold_log_factorials::<Infallible>(counts, &mut |_| Ok(()));
    constant
}

impl SegmentModel for PoissonRate {
    type Cache = PoissonCache;

    fn name(&self) -> &'static str {
        "poisson_rate"
    }

    fn validate(&self, x: &CountSeries<'_>) -> Result<(), CpdError> {
        x.counts()
            .iter()
            .try_fold(0u64, |acc, &count| acc.checked_add(count))
            .ok_or_else(|| cache_overflow_err(x.n()))?;
        Ok(())
    }

    fn precompute(&self, x: &CountSeries<'_>) -> Result<Self::Cache, CpdError> {
        let len = x.n().checked_add(1).ok_or_else(|| cache_overflow_err(x.n()))?;
        let mut prefix_sum = Vec::with_capacity(len);
        prefix_sum.push(0u64);
        let mut running = 0u64;
        for &count in x.counts() {
            running = running
                .checked_add(count)
                .ok_or_else(|| cache_overflow_err(x.n()))?;
            prefix_sum.push(running);
        }
        debug_assert_eq!(prefix_sum.len(), len);
        Ok(PoissonCache {
            counts: x.counts().to_vec(),
            prefix_sum,
        })
    }

    fn worst_case_cache_bytes(&self, x: &CountSeries<'_>) -> usize {
        x.n()
            .checked_mul(2)
            .and_then(|words| words.checked_add(1))
            .and_then(|words| words.checked_mul(std::mem::size_of::<u64>()))
            .unwrap_or(usize::MAX)
    }

    fn segment_estimate(&self, cache: &Self::Cache, start: usize, end: usize) -> f64 {
        assert!(
            start < end,
            "segment_estimate requires start < end; got start={start}, end={end}"
        );
        assert!(
            end <= cache.n(),
            "segment_estimate end out of bounds: end={end}, n={}",
            cache.n()
        );
        cache.segment_mean(start, end)
    }

    fn segment_log_likelihood(&self, cache: &Self::Cache, start: usize, end: usize) -> f64 {
        assert!(
            start < end,
            "segment_log_likelihood requires start < end; got start={start}, end={end}"
        );
        assert!(
            end <= cache.n(),
            "segment_log_likelihood end out of bounds: end={end}, n={}",
            cache.n()
        );
        accumulate_log_likelihood(&cache.counts[start..end], cache.segment_mean(start, end))
    }

    fn log_likelihood_constant(
        &self,
        x: &CountSeries<'_>,
        poll: &mut dyn FnMut(usize) -> Result<(), CpdError>,
    ) -> Result<f64, CpdError> {
        fold_log_factorials(x.counts(), poll)
    }
}
