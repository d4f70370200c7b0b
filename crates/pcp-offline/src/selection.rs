// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::table::DpTable;
use pcp_core::{CpdError, OrderScore};

/// Free parameters of a model with `change_count` changes: one intensity per
/// segment and one location per change.
pub fn parameter_count(change_count: usize) -> usize {
    change_count.saturating_mul(2).saturating_add(1)
}

/// AIC scores for every candidate order and the selected change count.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct OrderSelection {
    pub selected_change_count: usize,
    pub scores: Vec<OrderScore>,
}

impl OrderSelection {
    pub fn selected(&self) -> &OrderScore {
        &self.scores[self.selected_change_count]
    }
}

/// Reads `D(i, n)` for every candidate `i in [0, max_change_count]`.
pub fn terminal_log_likelihoods(table: &DpTable) -> Result<Vec<f64>, CpdError> {
    let n = table.n();
    (0..=table.max_change_count())
        .map(|change_count| {
            table
                .get(change_count, n)
                .map(|cell| cell.log_likelihood)
                .ok_or_else(|| {
                    CpdError::invalid_input(format!(
                        "terminal dp cell not resolved: change_count={change_count}, end={n}"
                    ))
                })
        })
        .collect()
}

/// Scores each candidate order with `AIC = -2 (D(i, n) + constant) + 2 (2i + 1)`
/// and keeps the first strict minimum, so ties resolve to fewer changes.
pub fn select_order(
    terminal_log_likelihoods: &[f64],
    log_likelihood_constant: f64,
) -> Result<OrderSelection, CpdError> {
    if terminal_log_likelihoods.is_empty() {
        return Err(CpdError::invalid_input(
            "order selection requires at least one candidate change count",
        ));
    }

    let mut scores = Vec::with_capacity(terminal_log_likelihoods.len());
    let mut selected_change_count = 0usize;
    let mut best_aic = f64::INFINITY;

    for (change_count, &dp_value) in terminal_log_likelihoods.iter().enumerate() {
        let parameter_count = parameter_count(change_count);
        let log_likelihood = dp_value + log_likelihood_constant;
        let aic = -2.0 * log_likelihood + 2.0 * parameter_count as f64;
        if !aic.is_finite() {
            return Err(CpdError::numerical_issue(format!(
                "non-finite AIC for change_count={change_count}: log_likelihood={log_likelihood}"
            )));
        }
        if aic < best_aic {
            best_aic = aic;
            selected_change_count = change_count;
        }
        scores.push(OrderScore {
            change_count,
            parameter_count,
            log_likelihood,
            aic,
        });
    }

    Ok(OrderSelection {
        selected_change_count,
        scores,
    })
}
