// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::table::DpTable;
use pcp_core::{CpdError, SegmentEstimate, segments_from_breakpoints, validate_breakpoints};
use pcp_costs::SegmentModel;

/// Segmentation recovered from the table for one change count.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Reconstruction {
    /// Ascending segment ends; the last entry is `n`.
    pub breakpoints: Vec<usize>,
    pub segments: Vec<SegmentEstimate>,
    /// Per-index intensity, constant within each segment.
    pub intensities: Vec<f64>,
}

/// Follows backpointers from `(change_count, n)` down to `τ = 0`.
pub fn backtrack_breakpoints(table: &DpTable, change_count: usize) -> Result<Vec<usize>, CpdError> {
    let n = table.n();
    let mut end = n;
    let mut breakpoints_reversed = Vec::with_capacity(change_count + 1);

    for k in (0..=change_count).rev() {
        let Some(cell) = table.get(k, end) else {
            return Err(CpdError::invalid_input(format!(
                "backtracking failed: unresolved cell at change_count={k}, end={end}"
            )));
        };
        if cell.backpointer >= end {
            return Err(CpdError::invalid_input(format!(
                "backtracking failed: backpointer={} does not precede end={end} at change_count={k}",
                cell.backpointer
            )));
        }
        breakpoints_reversed.push(end);
        end = cell.backpointer;
    }

    if end != 0 {
        return Err(CpdError::invalid_input(format!(
            "backtracking failed: walk from change_count={change_count} ended at {end}, expected 0"
        )));
    }

    breakpoints_reversed.reverse();
    validate_breakpoints(n, &breakpoints_reversed)
        .map_err(|err| CpdError::invalid_input(format!("backtracking failed: {err}")))?;
    Ok(breakpoints_reversed)
}

/// Backtracks `change_count` changes and assigns each segment its MLE intensity.
pub fn reconstruct<M: SegmentModel>(
    model: &M,
    cache: &M::Cache,
    table: &DpTable,
    change_count: usize,
) -> Result<Reconstruction, CpdError> {
    let n = table.n();
    let breakpoints = backtrack_breakpoints(table, change_count)?;
    let mut intensities = vec![0.0; n];
    let mut segments = Vec::with_capacity(breakpoints.len());

    for (start, end) in segments_from_breakpoints(n, &breakpoints) {
        let intensity = model.segment_estimate(cache, start, end);
        if !intensity.is_finite() {
            return Err(CpdError::numerical_issue(format!(
                "non-finite intensity estimate at [{start}, {end}): {intensity}"
            )));
        }
        intensities[start..end].fill(intensity);
        segments.push(SegmentEstimate {
            start,
            end,
            intensity,
        });
    }

    Ok(Reconstruction {
        breakpoints,
        segments,
        intensities,
    })
}
