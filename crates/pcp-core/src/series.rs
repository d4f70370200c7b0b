// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::CpdError;

/// Tolerance used when accepting floating-point inputs as integer counts.
pub const INTEGER_TOL: f64 = 1e-9;

/// Zero-copy view over a validated, non-empty sequence of event counts.
///
/// Position `t` in the view is observation `t + 1` of a one-based series, so
/// the half-open range `[start, end)` covers the one-based observations
/// `start + 1 ..= end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CountSeries<'a> {
    counts: &'a [u64],
}

impl<'a> CountSeries<'a> {
    /// Creates a view after checking that at least one observation exists.
    pub fn new(counts: &'a [u64]) -> Result<Self, CpdError> {
        if counts.is_empty() {
            return Err(CpdError::invalid_input(
                "count series length 0; minimum is 1",
            ));
        }
        Ok(Self { counts })
    }

    /// Number of analyzable observations (`T`).
    pub fn n(&self) -> usize {
        self.counts.len()
    }

    pub fn counts(&self) -> &'a [u64] {
        self.counts
    }

    /// Returns true when every observation is zero.
    pub fn is_all_zero(&self) -> bool {
        self.counts.iter().all(|&count| count == 0)
    }
}

fn normalize_count(value: f64, t: usize) -> Result<u64, CpdError> {
    if !value.is_finite() || value < 0.0 {
        return Err(CpdError::invalid_input(format!(
            "counts must be non-negative and finite; got value={value} at t={t}"
        )));
    }

    let rounded = value.round();
    if (rounded - value).abs() > INTEGER_TOL {
        return Err(CpdError::invalid_input(format!(
            "counts must be integer-valued; got value={value} at t={t}"
        )));
    }

    if rounded >= u64::MAX as f64 {
        return Err(CpdError::invalid_input(format!(
            "count {value} at t={t} does not fit into u64"
        )));
    }

    Ok(rounded as u64)
}

/// Converts signed counts, rejecting negative values.
pub fn counts_from_i64(values: &[i64]) -> Result<Vec<u64>, CpdError> {
    values
        .iter()
        .enumerate()
        .map(|(t, &value)| {
            u64::try_from(value).map_err(|_| {
                CpdError::invalid_input(format!(
                    "counts must be non-negative; got value={value} at t={t}"
                ))
            })
        })
        .collect()
}

/// Converts floating-point counts, rejecting negative, non-finite and
/// fractional values.
pub fn counts_from_f64(values: &[f64]) -> Result<Vec<u64>, CpdError> {
    values
        .iter()
        .enumerate()
        .map(|(t, &value)| normalize_count(value, t))
        .collect()
}

/// Converts a legacy one-based buffer of length `T + 1` whose element 0 is an
/// unused sentinel.
pub fn counts_from_sentinel_prefixed(values: &[i64]) -> Result<Vec<u64>, CpdError> {
    if values.len() < 2 {
        return Err(CpdError::invalid_input(format!(
            "sentinel-prefixed series needs length >= 2 (sentinel plus one observation); got length={}",
            values.len()
        )));
    }
    counts_from_i64(&values[1..])
}
