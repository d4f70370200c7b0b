// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

/// Failure of a count-series detection run.
///
/// Bad counts, empty series and out-of-table DP states are rejected as
/// `InvalidInput` before any segment is scored.
#[derive(thiserror::Error, Debug)]
pub enum CpdError {
    /// Empty or non-integer counts, bad constraints, or an impossible
    /// `(change_count, end)` state.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A segment log-likelihood, DP value, intensity or AIC came out
    /// non-finite.
    #[error("numerical issue: {0}")]
    NumericalIssue(String),
    /// Count totals overflow `u64`, or a memory, time or segment-eval budget
    /// ran out under `BudgetMode::HardFail`.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),
    /// The run's `CancelToken` fired.
    #[error("cancelled")]
    Cancelled,
}

impl CpdError {
    /// Creates a `CpdError::InvalidInput`.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates a `CpdError::NumericalIssue`.
    pub fn numerical_issue(msg: impl Into<String>) -> Self {
        Self::NumericalIssue(msg.into())
    }

    /// Creates a `CpdError::ResourceLimit`.
    pub fn resource_limit(msg: impl Into<String>) -> Self {
        Self::ResourceLimit(msg.into())
    }

    /// Creates a `CpdError::Cancelled`.
    pub fn cancelled() -> Self {
        Self::Cancelled
    }
}
