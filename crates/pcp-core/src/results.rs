// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::CpdError;

/// Constant-intensity segment `[start, end)` with its maximum-likelihood rate.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentEstimate {
    pub start: usize,
    pub end: usize,
    pub intensity: f64,
}

impl SegmentEstimate {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Model-order score for one candidate change count.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct OrderScore {
    pub change_count: usize,
    pub parameter_count: usize,
    /// Full log-likelihood including the factorial normalization constant.
    pub log_likelihood: f64,
    pub aic: f64,
}

/// Validates breakpoint conventions: non-empty, strictly increasing, every
/// entry in `1..=n`, last entry equal to `n`.
pub fn validate_breakpoints(n: usize, breakpoints: &[usize]) -> Result<(), CpdError> {
    if n == 0 {
        if breakpoints.is_empty() {
            return Ok(());
        }
        return Err(CpdError::invalid_input(format!(
            "breakpoints must be empty when n=0; got breakpoints={breakpoints:?}"
        )));
    }

    let Some(&last) = breakpoints.last() else {
        return Err(CpdError::invalid_input(format!(
            "breakpoints must be non-empty and include n={n} as the final element"
        )));
    };

    let mut prev: Option<usize> = None;
    for (idx, &bp) in breakpoints.iter().enumerate() {
        if bp == 0 {
            return Err(CpdError::invalid_input(format!(
                "breakpoints[{idx}] must be > 0; got 0"
            )));
        }
        if bp > n {
            return Err(CpdError::invalid_input(format!(
                "breakpoints[{idx}] must be <= n; got breakpoint={bp}, n={n}"
            )));
        }
        if let Some(prev_bp) = prev
            && bp <= prev_bp
        {
            return Err(CpdError::invalid_input(format!(
                "breakpoints must be strictly increasing and unique: breakpoints[{idx}]={bp}, previous={prev_bp}"
            )));
        }
        prev = Some(bp);
    }

    if last != n {
        return Err(CpdError::invalid_input(format!(
            "breakpoints must include n as the final element: last={last}, n={n}"
        )));
    }

    Ok(())
}

/// Breakpoints excluding the terminal `n`.
pub fn change_points_from_breakpoints(n: usize, breakpoints: &[usize]) -> Vec<usize> {
    breakpoints.iter().copied().filter(|&bp| bp < n).collect()
}

/// Converts validated breakpoints into contiguous `[start, end)` segments.
pub fn segments_from_breakpoints(n: usize, breakpoints: &[usize]) -> Vec<(usize, usize)> {
    debug_assert!(
        validate_breakpoints(n, breakpoints).is_ok(),
        "segments_from_breakpoints expects validated breakpoints"
    );

    let mut segments = Vec::with_capacity(breakpoints.len());
    let mut start = 0usize;
    for &end in breakpoints {
        segments.push((start, end));
        start = end;
    }
    segments
}
