// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use pcp_core::{CountSeries, CpdError};

/// Shared contract for segment models used by the multi-step detector.
///
/// Segment conventions use half-open intervals over zero-based positions:
/// `[start, end)`, which is the one-based `(start, end]` of the classic
/// formulation.
pub trait SegmentModel {
    type Cache: Send + Sync;

    fn name(&self) -> &'static str;

    fn validate(&self, x: &CountSeries<'_>) -> Result<(), CpdError>;

    fn precompute(&self, x: &CountSeries<'_>) -> Result<Self::Cache, CpdError>;

    fn worst_case_cache_bytes(&self, x: &CountSeries<'_>) -> usize;

    /// Maximum-likelihood parameter of segment `[start, end)`.
    fn segment_estimate(&self, cache: &Self::Cache, start: usize, end: usize) -> f64;

    /// Segmentation-dependent part of the log-likelihood of `[start, end)`.
    fn segment_log_likelihood(&self, cache: &Self::Cache, start: usize, end: usize) -> f64;

    /// Log-likelihood term shared by every segmentation of `x`.
    ///
    /// `poll` receives the amount of work about to be done and may abort the
    /// computation by returning an error, which is passed through unchanged.
    fn log_likelihood_constant(
        &self,
        x: &CountSeries<'_>,
        poll: &mut dyn FnMut(usize) -> Result<(), CpdError>,
    ) -> Result<f64, CpdError>;
}
