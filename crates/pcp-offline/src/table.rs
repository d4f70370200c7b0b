// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use pcp_core::CpdError;
use std::mem::size_of;

/// Resolved state `(k, τ)`: best log-likelihood of splitting `[0, τ)` into
/// `k + 1` segments, and the start of the last of those segments.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DpCell {
    pub log_likelihood: f64,
    pub backpointer: usize,
}

/// Returns true for states the recursion can reach: `1 <= τ` and `k < τ`.
pub fn is_valid_state(change_count: usize, end: usize) -> bool {
    end >= 1 && change_count < end
}

/// Write-once dynamic-programming table over `k in [0, max_change_count]`
/// and `τ in [0, n]`.
///
/// Values and backpointers share one cell, so a state is either fully
/// resolved or not visited at all.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct DpTable {
    n: usize,
    max_change_count: usize,
    cells: Vec<Option<DpCell>>,
    resolved: usize,
}

fn table_dims(n: usize, max_change_count: usize) -> Result<(usize, usize), CpdError> {
    let rows = max_change_count
        .checked_add(1)
        .ok_or_else(|| CpdError::resource_limit("dp table row count overflow"))?;
    let columns = n
        .checked_add(1)
        .ok_or_else(|| CpdError::resource_limit("dp table column count overflow"))?;
    Ok((rows, columns))
}

impl DpTable {
    pub fn new(n: usize, max_change_count: usize) -> Result<Self, CpdError> {
        if n == 0 {
            return Err(CpdError::invalid_input("dp table requires n >= 1; got n=0"));
        }
        if max_change_count >= n {
            return Err(CpdError::invalid_input(format!(
                "dp table max_change_count must be < n; got max_change_count={max_change_count}, n={n}"
            )));
        }
        let (rows, columns) = table_dims(n, max_change_count)?;
        let cell_count = rows
            .checked_mul(columns)
            .ok_or_else(|| CpdError::resource_limit("dp table cell count overflow"))?;
        Ok(Self {
            n,
            max_change_count,
            cells: vec![None; cell_count],
            resolved: 0,
        })
    }

    /// Bytes held by a table with these dimensions.
    pub fn estimated_bytes(n: usize, max_change_count: usize) -> Result<usize, CpdError> {
        let (rows, columns) = table_dims(n, max_change_count)?;
        rows.checked_mul(columns)
            .and_then(|cells| cells.checked_mul(size_of::<Option<DpCell>>()))
            .ok_or_else(|| CpdError::resource_limit("dp table bytes overflow"))
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn max_change_count(&self) -> usize {
        self.max_change_count
    }

    pub fn resolved_cells(&self) -> usize {
        self.resolved
    }

    fn index(&self, change_count: usize, end: usize) -> Option<usize> {
        if change_count > self.max_change_count || end > self.n {
            return None;
        }
        Some(change_count * (self.n + 1) + end)
    }

    /// Resolved cell for `(k, τ)`, or `None` when unvisited or outside the table.
    pub fn get(&self, change_count: usize, end: usize) -> Option<DpCell> {
        self.index(change_count, end)
            .and_then(|idx| self.cells[idx])
    }

    pub fn is_resolved(&self, change_count: usize, end: usize) -> bool {
        self.get(change_count, end).is_some()
    }

    /// Stores a resolved cell. Each state may be written once per run.
    pub fn insert(&mut self, change_count: usize, end: usize, cell: DpCell) -> Result<(), CpdError> {
        if !is_valid_state(change_count, end) {
            return Err(CpdError::invalid_input(format!(
                "invalid dp state: requires 1 <= end and change_count < end; got change_count={change_count}, end={end}"
            )));
        }
        let Some(idx) = self.index(change_count, end) else {
            return Err(CpdError::invalid_input(format!(
                "dp state outside table: change_count={change_count}, end={end}, max_change_count={}, n={}",
                self.max_change_count, self.n
            )));
        };
        if cell.backpointer >= end {
            return Err(CpdError::invalid_input(format!(
                "dp backpointer must be < end; got backpointer={}, end={end}",
                cell.backpointer
            )));
        }
        if self.cells[idx].is_some() {
            return Err(CpdError::invalid_input(format!(
                "dp cell already resolved: change_count={change_count}, end={end}"
            )));
        }
        self.cells[idx] = Some(cell);
        self.resolved += 1;
        Ok(())
    }
}
