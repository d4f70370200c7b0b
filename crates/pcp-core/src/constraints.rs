// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::CpdError;

/// User-facing limits applied to a detection run.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Constraints {
    /// Upper bound on candidate change counts. `None` searches every count in
    /// `[0, n)`.
    pub max_change_points: Option<usize>,
    pub time_budget_ms: Option<u64>,
    /// Limit on segment log-likelihood evaluations.
    pub max_cost_evals: Option<usize>,
    /// Limit on the estimated size of the dynamic-programming state.
    pub memory_budget_bytes: Option<usize>,
}

/// Prevalidated constraints passed into detector execution paths.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedConstraints {
    pub n: usize,
    /// Largest change count that will be evaluated: `min(n - 1, cap)`.
    pub max_change_count: usize,
    pub time_budget_ms: Option<u64>,
    pub max_cost_evals: Option<usize>,
    pub memory_budget_bytes: Option<usize>,
}

impl ValidatedConstraints {
    /// Number of candidate change counts, `max_change_count + 1`.
    pub fn candidate_orders(&self) -> usize {
        self.max_change_count + 1
    }
}

/// Validates constraints against a series of length `n`.
pub fn validate_constraints(
    constraints: &Constraints,
    n: usize,
) -> Result<ValidatedConstraints, CpdError> {
    if n == 0 {
        return Err(CpdError::invalid_input(
            "constraints require a series with n >= 1; got n=0",
        ));
    }

    if constraints.time_budget_ms == Some(0) {
        return Err(CpdError::invalid_input(
            "constraints.time_budget_ms must be > 0 when set; got 0",
        ));
    }

    if constraints.max_cost_evals == Some(0) {
        return Err(CpdError::invalid_input(
            "constraints.max_cost_evals must be > 0 when set; got 0",
        ));
    }

    if constraints.memory_budget_bytes == Some(0) {
        return Err(CpdError::invalid_input(
            "constraints.memory_budget_bytes must be > 0 when set; got 0",
        ));
    }

    let structural_max = n - 1;
    let max_change_count = match constraints.max_change_points {
        Some(cap) => cap.min(structural_max),
        None => structural_max,
    };

    Ok(ValidatedConstraints {
        n,
        max_change_count,
        time_budget_ms: constraints.time_budget_ms,
        max_cost_evals: constraints.max_cost_evals,
        memory_budget_bytes: constraints.memory_budget_bytes,
    })
}
