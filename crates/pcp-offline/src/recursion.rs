// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::table::{DpCell, DpTable, is_valid_state};
use pcp_core::{BudgetStatus, CpdError, DpStats, ExecutionContext};
use pcp_costs::SegmentModel;
use std::time::Instant;

fn checked_counter_increment(counter: &mut usize, name: &str) -> Result<(), CpdError> {
    *counter = counter
        .checked_add(1)
        .ok_or_else(|| CpdError::resource_limit(format!("{name} counter overflow")))?;
    Ok(())
}

/// Cancellation, budget and work accounting for one detection run.
pub struct RunControl<'c, 'a> {
    ctx: &'c ExecutionContext<'a>,
    started_at: Instant,
    cancel_check_every: usize,
    steps: usize,
    stats: DpStats,
    soft_budget_exceeded: bool,
}

impl<'c, 'a> RunControl<'c, 'a> {
    pub fn new(ctx: &'c ExecutionContext<'a>, cancel_check_every: usize) -> Self {
        Self {
            ctx,
            started_at: Instant::now(),
            cancel_check_every: cancel_check_every.max(1),
            steps: 0,
            stats: DpStats::default(),
            soft_budget_exceeded: false,
        }
    }

    pub fn ctx(&self) -> &'c ExecutionContext<'a> {
        self.ctx
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn stats(&self) -> &DpStats {
        &self.stats
    }

    pub fn soft_budget_exceeded(&self) -> bool {
        self.soft_budget_exceeded
    }

    fn note_budget(&mut self, status: BudgetStatus) {
        if status == BudgetStatus::ExceededSoftDegrade {
            self.soft_budget_exceeded = true;
        }
    }

    fn poll(&mut self) -> Result<(), CpdError> {
        self.ctx.check_cancelled()?;
        let status = self.ctx.check_time_budget(self.started_at)?;
        self.note_budget(status);
        Ok(())
    }

    /// Counts `work` units and polls cancellation and the time budget each
    /// time the running total crosses a multiple of `cancel_check_every`.
    pub(crate) fn step_by(&mut self, work: usize) -> Result<(), CpdError> {
        let before = self.steps;
        self.steps = before
            .checked_add(work)
            .ok_or_else(|| CpdError::resource_limit("dp step counter overflow"))?;
        if before / self.cancel_check_every != self.steps / self.cancel_check_every {
            self.poll()?;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<(), CpdError> {
        self.step_by(1)
    }

    fn record_segment_eval(&mut self) -> Result<(), CpdError> {
        checked_counter_increment(&mut self.stats.segment_evals, "segment_evals")?;
        let status = self.ctx.check_cost_eval_budget(self.stats.segment_evals)?;
        self.note_budget(status);
        Ok(())
    }

    fn record_pending_depth(&mut self, depth: usize) {
        self.stats.max_pending_depth = self.stats.max_pending_depth.max(depth);
    }

    fn record_resolved_cell(&mut self) -> Result<(), CpdError> {
        checked_counter_increment(&mut self.stats.resolved_cells, "resolved_cells")
    }
}

/// Multi-step recurrence over a write-once [`DpTable`].
///
/// State `(k, τ)` holds the best log-likelihood of `[0, τ)` split into `k + 1`
/// constant-intensity segments. For `k >= 1` the cell compares
///
/// - (a) a new last segment `[τ-1, τ)` after the best `k - 1` split of
///   `[0, τ-1)`, and
/// - (b) extending the last segment of the best `k` split of `[0, τ-1)`
///   through `τ`, when `k + 1 < τ`.
///
/// (b) replaces (a) only when strictly greater.
pub struct DpRecursion<'m, M: SegmentModel> {
    model: &'m M,
    cache: &'m M::Cache,
    table: DpTable,
}

impl<'m, M: SegmentModel> DpRecursion<'m, M> {
    pub fn new(
        model: &'m M,
        cache: &'m M::Cache,
        n: usize,
        max_change_count: usize,
    ) -> Result<Self, CpdError> {
        Ok(Self {
            model,
            cache,
            table: DpTable::new(n, max_change_count)?,
        })
    }

    pub fn table(&self) -> &DpTable {
        &self.table
    }

    pub fn into_table(self) -> DpTable {
        self.table
    }

    fn check_state(&self, change_count: usize, end: usize) -> Result<(), CpdError> {
        if !is_valid_state(change_count, end) {
            return Err(CpdError::invalid_input(format!(
                "invalid dp state: requires 1 <= end and change_count < end; got change_count={change_count}, end={end}"
            )));
        }
        if change_count > self.table.max_change_count() || end > self.table.n() {
            return Err(CpdError::invalid_input(format!(
                "dp state outside table: change_count={change_count}, end={end}, max_change_count={}, n={}",
                self.table.max_change_count(),
                self.table.n()
            )));
        }
        Ok(())
    }

    fn resolved(&self, change_count: usize, end: usize) -> Result<DpCell, CpdError> {
        self.table.get(change_count, end).ok_or_else(|| {
            CpdError::invalid_input(format!(
                "dp dependency not resolved: change_count={change_count}, end={end}"
            ))
        })
    }

    fn segment_log_likelihood(
        &self,
        start: usize,
        end: usize,
        control: &mut RunControl<'_, '_>,
    ) -> Result<f64, CpdError> {
        control.record_segment_eval()?;
        let value = self.model.segment_log_likelihood(self.cache, start, end);
        if !value.is_finite() {
            return Err(CpdError::numerical_issue(format!(
                "non-finite segment log-likelihood at [{start}, {end}): {value}"
            )));
        }
        Ok(value)
    }

    /// First unresolved state `(k, τ)` depends on, in evaluation order.
    fn missing_dependency(
        &self,
        change_count: usize,
        end: usize,
    ) -> Result<Option<(usize, usize)>, CpdError> {
        if change_count == 0 {
            return Ok(None);
        }
        if !self.table.is_resolved(change_count - 1, end - 1) {
            return Ok(Some((change_count - 1, end - 1)));
        }
        if change_count + 1 < end {
            let Some(extended) = self.table.get(change_count, end - 1) else {
                return Ok(Some((change_count, end - 1)));
            };
            let start = extended.backpointer;
            if start < change_count {
                return Err(CpdError::numerical_issue(format!(
                    "dp backpointer below change count at change_count={change_count}, end={}: backpointer={start}",
                    end - 1
                )));
            }
            if !self.table.is_resolved(change_count - 1, start) {
                return Ok(Some((change_count - 1, start)));
            }
        }
        Ok(None)
    }

    /// Computes `(k, τ)` from already-resolved dependencies and stores it.
    fn compute_cell(
        &mut self,
        change_count: usize,
        end: usize,
        control: &mut RunControl<'_, '_>,
    ) -> Result<DpCell, CpdError> {
        let cell = if change_count == 0 {
            DpCell {
                log_likelihood: self.segment_log_likelihood(0, end, control)?,
                backpointer: 0,
            }
        } else {
            let shorter = self.resolved(change_count - 1, end - 1)?;
            let mut best = DpCell {
                log_likelihood: shorter.log_likelihood
                    + self.segment_log_likelihood(end - 1, end, control)?,
                backpointer: end - 1,
            };

            if change_count + 1 < end {
                let start = self.resolved(change_count, end - 1)?.backpointer;
                let head = self.resolved(change_count - 1, start)?;
                let extended =
                    head.log_likelihood + self.segment_log_likelihood(start, end, control)?;
                if extended > best.log_likelihood {
                    best = DpCell {
                        log_likelihood: extended,
                        backpointer: start,
                    };
                }
            }
            best
        };

        if !cell.log_likelihood.is_finite() {
            return Err(CpdError::numerical_issue(format!(
                "non-finite dp value at change_count={change_count}, end={end}: {}",
                cell.log_likelihood
            )));
        }
        self.table.insert(change_count, end, cell)?;
        control.record_resolved_cell()?;
        Ok(cell)
    }

    /// Resolves `(k, τ)` on demand, memoizing every state it touches.
    ///
    /// Dependencies are tracked on a heap-allocated work stack, so series
    /// length does not bound call-stack depth. Resolving an already-resolved
    /// state is a table lookup.
    pub fn resolve(
        &mut self,
        change_count: usize,
        end: usize,
        control: &mut RunControl<'_, '_>,
    ) -> Result<DpCell, CpdError> {
        self.check_state(change_count, end)?;
        if let Some(cell) = self.table.get(change_count, end) {
            return Ok(cell);
        }

        let mut pending = vec![(change_count, end)];
        control.record_pending_depth(pending.len());
        while let Some(&(k, tau)) = pending.last() {
            control.step()?;
            if self.table.is_resolved(k, tau) {
                pending.pop();
                continue;
            }
            match self.missing_dependency(k, tau)? {
                Some(dependency) => {
                    pending.push(dependency);
                    control.record_pending_depth(pending.len());
                }
                None => {
                    self.compute_cell(k, tau, control)?;
                    pending.pop();
                }
            }
        }

        self.resolved(change_count, end)
    }

    /// Fills every state of the table in increasing `τ`, then increasing `k`.
    pub fn fill_bottom_up(&mut self, control: &mut RunControl<'_, '_>) -> Result<(), CpdError> {
        let n = self.table.n();
        let max_change_count = self.table.max_change_count();
        for end in 1..=n {
            for change_count in 0..=max_change_count.min(end - 1) {
                control.step()?;
                if self.table.is_resolved(change_count, end) {
                    continue;
                }
                self.compute_cell(change_count, end, control)?;
            }
            control.ctx().report_progress(end as f32 / n as f32);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DpRecursion, RunControl};
    use pcp_core::{
        BudgetMode, CancelToken, Constraints, CountSeries, CpdError, ExecutionContext,
    };
    use pcp_costs::{PoissonCache, PoissonRate, SegmentModel, segment_log_likelihood};

    const TWO_REGIME: [u64; 20] = [2, 1, 3, 2, 2, 1, 3, 2, 2, 2, 10, 9, 11, 10, 12, 8, 10, 11, 9, 10];

    fn cache_for(counts: &[u64]) -> PoissonCache {
        let series = CountSeries::new(counts).expect("series should be valid");
        PoissonRate
            .precompute(&series)
            .expect("precompute should succeed")
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-12 * (1.0 + expected.abs()),
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn base_and_first_recursive_cells_match_hand_computation() {
        let counts = [1_u64, 4, 4, 0];
        let cache = cache_for(&counts);
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let mut control = RunControl::new(&ctx, 1);
        let mut recursion =
            DpRecursion::new(&PoissonRate, &cache, counts.len(), 3).expect("recursion");

        let base = recursion.resolve(0, 3, &mut control).expect("base cell");
        assert_eq!(base.backpointer, 0);
        assert_close(
            base.log_likelihood,
            PoissonRate.segment_log_likelihood(&cache, 0, 3),
        );

        let one_change = recursion.resolve(1, 2, &mut control).expect("(1, 2)");
        assert_eq!(one_change.backpointer, 1);
        assert_close(
            one_change.log_likelihood,
            PoissonRate.segment_log_likelihood(&cache, 0, 1)
                + PoissonRate.segment_log_likelihood(&cache, 1, 2),
        );
    }

    #[test]
    fn two_regime_one_change_cell_points_at_regime_boundary() {
        let cache = cache_for(&TWO_REGIME);
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let mut control = RunControl::new(&ctx, 1);
        let mut recursion =
            DpRecursion::new(&PoissonRate, &cache, TWO_REGIME.len(), 1).expect("recursion");

        let cell = recursion.resolve(1, 20, &mut control).expect("(1, 20)");
        assert_eq!(cell.backpointer, 10);
        assert_close(
            cell.log_likelihood,
            PoissonRate.segment_log_likelihood(&cache, 0, 10)
                + PoissonRate.segment_log_likelihood(&cache, 10, 20),
        );
        assert!(control.stats().max_pending_depth >= 2);
        assert_eq!(control.stats().resolved_cells, recursion.table().resolved_cells());
    }

    #[test]
    fn resolving_twice_is_a_lookup() {
        let cache = cache_for(&TWO_REGIME);
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let mut control = RunControl::new(&ctx, 1);
        let mut recursion =
            DpRecursion::new(&PoissonRate, &cache, TWO_REGIME.len(), 4).expect("recursion");

        let first = recursion.resolve(4, 20, &mut control).expect("first resolve");
        let evals = control.stats().segment_evals;
        let resolved = recursion.table().resolved_cells();

        let second = recursion.resolve(4, 20, &mut control).expect("second resolve");
        assert_eq!(first, second);
        assert_eq!(first.log_likelihood.to_bits(), second.log_likelihood.to_bits());
        assert_eq!(control.stats().segment_evals, evals);
        assert_eq!(recursion.table().resolved_cells(), resolved);
    }

    #[test]
    fn backpointers_are_at_least_the_change_count() {
        let cache = cache_for(&TWO_REGIME);
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let mut control = RunControl::new(&ctx, 1);
        let mut recursion =
            DpRecursion::new(&PoissonRate, &cache, TWO_REGIME.len(), 19).expect("recursion");
        recursion
            .fill_bottom_up(&mut control)
            .expect("bottom-up fill");

        let table = recursion.table();
        for k in 0..=19 {
            for tau in (k + 1)..=20 {
                let cell = table.get(k, tau).expect("bottom-up fills every valid state");
                assert!(cell.backpointer >= k, "k={k}, tau={tau}, cell={cell:?}");
                assert!(cell.backpointer < tau);
            }
        }
    }

    #[test]
    fn on_demand_matches_bottom_up_bit_for_bit() {
        let counts = [0_u64, 0, 3, 7, 1, 0, 0, 5, 5, 6, 2, 0, 9, 1];
        let cache = cache_for(&counts);
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let n = counts.len();
        let max_k = n - 1;

        let mut control = RunControl::new(&ctx, 1);
        let mut lazy = DpRecursion::new(&PoissonRate, &cache, n, max_k).expect("recursion");
        for k in 0..=max_k {
            lazy.resolve(k, n, &mut control).expect("on-demand resolve");
        }

        let mut control = RunControl::new(&ctx, 1);
        let mut eager = DpRecursion::new(&PoissonRate, &cache, n, max_k).expect("recursion");
        eager.fill_bottom_up(&mut control).expect("bottom-up fill");

        for k in 0..=max_k {
            for tau in 1..=n {
                if let Some(lazy_cell) = lazy.table().get(k, tau) {
                    let eager_cell = eager.table().get(k, tau).expect("eager has every cell");
                    assert_eq!(
                        lazy_cell.log_likelihood.to_bits(),
                        eager_cell.log_likelihood.to_bits()
                    );
                    assert_eq!(lazy_cell.backpointer, eager_cell.backpointer);
                }
            }
        }
    }

    #[test]
    fn all_zero_series_ties_keep_the_unit_last_segment() {
        let counts = [0_u64; 7];
        let cache = cache_for(&counts);
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let mut control = RunControl::new(&ctx, 1);
        let mut recursion =
            DpRecursion::new(&PoissonRate, &cache, counts.len(), 6).expect("recursion");
        recursion
            .fill_bottom_up(&mut control)
            .expect("bottom-up fill");

        let table = recursion.table();
        for tau in 1..=7 {
            let base = table.get(0, tau).expect("base cell");
            assert_eq!(base.log_likelihood.to_bits(), 0.0_f64.to_bits());
            assert_eq!(base.backpointer, 0);
        }
        for k in 1..=6 {
            for tau in (k + 1)..=7 {
                let cell = table.get(k, tau).expect("bottom-up fills every valid state");
                assert_eq!(cell.log_likelihood.to_bits(), 0.0_f64.to_bits());
                assert_eq!(cell.backpointer, tau - 1, "k={k}, tau={tau}");
            }
        }
    }

    #[test]
    fn mixed_zero_series_cells_are_bit_identical_to_summed_segments() {
        let counts = [0_u64, 0, 2, 0, 4, 6, 0, 3, 4, 0, 3, 2, 0];
        let n = counts.len();
        let cache = cache_for(&counts);
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let mut control = RunControl::new(&ctx, 1);
        let mut recursion = DpRecursion::new(&PoissonRate, &cache, n, 3).expect("recursion");
        recursion
            .fill_bottom_up(&mut control)
            .expect("bottom-up fill");
        let table = recursion.table();

        let last = table.get(2, n).expect("(2, n)");
        assert_eq!(last.backpointer, 12);
        let middle = table.get(1, 12).expect("(1, 12)");
        assert_eq!(middle.backpointer, 2);

        let reference = |start: usize, end: usize| {
            segment_log_likelihood(&counts, start, end).expect("reference segment")
        };
        assert_eq!(
            table.get(0, 2).expect("(0, 2)").log_likelihood.to_bits(),
            reference(0, 2).to_bits()
        );
        assert_eq!(
            middle.log_likelihood.to_bits(),
            (reference(0, 2) + reference(2, 12)).to_bits()
        );
        for start in 0..n {
            for end in (start + 1)..=n {
                assert_eq!(
                    PoissonRate
                        .segment_log_likelihood(&cache, start, end)
                        .to_bits(),
                    reference(start, end).to_bits(),
                    "[{start}, {end})"
                );
            }
        }
    }

    #[test]
    fn run_control_polls_when_work_crosses_the_cadence() {
        let constraints = Constraints::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = ExecutionContext::new(&constraints).with_cancel(&cancel);

        let mut control = RunControl::new(&ctx, 4);
        control.step_by(3).expect("no cadence boundary crossed yet");
        control.step_by(0).expect("empty work never polls");
        let err = control.step_by(1).expect_err("step 4 polls");
        assert!(matches!(err, CpdError::Cancelled));

        let mut control = RunControl::new(&ctx, 4);
        control.step_by(1).expect("no cadence boundary crossed yet");
        let err = control
            .step_by(100)
            .expect_err("a large batch crosses the cadence");
        assert!(matches!(err, CpdError::Cancelled));
    }

    #[test]
    fn long_series_resolves_without_call_stack_growth() {
        let counts: Vec<u64> = (0..3_000).map(|t| if t < 1_500 { 2 } else { 7 }).collect();
        let cache = cache_for(&counts);
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let mut control = RunControl::new(&ctx, 1_000);
        let mut recursion =
            DpRecursion::new(&PoissonRate, &cache, counts.len(), 1).expect("recursion");

        let cell = recursion
            .resolve(1, counts.len(), &mut control)
            .expect("deep resolve");
        assert_eq!(cell.backpointer, 1_500);
        assert!(control.stats().max_pending_depth > 1_000);
    }

    #[test]
    fn invalid_states_are_rejected() {
        let cache = cache_for(&[1, 2, 3]);
        let constraints = Constraints::default();
        let ctx = ExecutionContext::new(&constraints);
        let mut control = RunControl::new(&ctx, 1);
        let mut recursion = DpRecursion::new(&PoissonRate, &cache, 3, 2).expect("recursion");

        let err = recursion
            .resolve(2, 2, &mut control)
            .expect_err("k >= end is not a valid state");
        assert!(matches!(err, CpdError::InvalidInput(_)));
        let err = recursion
            .resolve(0, 0, &mut control)
            .expect_err("end=0 is not a valid state");
        assert!(err.to_string().contains("invalid dp state"));
        let err = recursion
            .resolve(0, 4, &mut control)
            .expect_err("end > n is outside the table");
        assert!(err.to_string().contains("outside table"));
    }

    #[test]
    fn cancelled_token_stops_resolution() {
        let cache = cache_for(&TWO_REGIME);
        let constraints = Constraints::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = ExecutionContext::new(&constraints).with_cancel(&cancel);
        let mut control = RunControl::new(&ctx, 1);
        let mut recursion =
            DpRecursion::new(&PoissonRate, &cache, TWO_REGIME.len(), 2).expect("recursion");

        let err = recursion
            .resolve(2, 20, &mut control)
            .expect_err("cancelled token must stop resolution");
        assert_eq!(err.to_string(), "cancelled");
    }

    #[test]
    fn segment_eval_budget_hard_fail_and_soft_degrade() {
        let cache = cache_for(&TWO_REGIME);
        let constraints = Constraints {
            max_cost_evals: Some(3),
            ..Constraints::default()
        };

        let ctx = ExecutionContext::new(&constraints).with_budget_mode(BudgetMode::HardFail);
        let mut control = RunControl::new(&ctx, 1);
        let mut recursion =
            DpRecursion::new(&PoissonRate, &cache, TWO_REGIME.len(), 2).expect("recursion");
        let err = recursion
            .resolve(2, 20, &mut control)
            .expect_err("hard budget should fail");
        assert!(err.to_string().contains("max_cost_evals"));

        let ctx = ExecutionContext::new(&constraints).with_budget_mode(BudgetMode::SoftDegrade);
        let mut control = RunControl::new(&ctx, 1);
        let mut recursion =
            DpRecursion::new(&PoissonRate, &cache, TWO_REGIME.len(), 2).expect("recursion");
        recursion
            .resolve(2, 20, &mut control)
            .expect("soft budget continues");
        assert!(control.soft_budget_exceeded());
    }
}
