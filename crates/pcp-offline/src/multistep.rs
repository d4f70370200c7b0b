// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::reconstruct::reconstruct;
use crate::recursion::{DpRecursion, RunControl};
use crate::selection::{select_order, terminal_log_likelihoods};
use crate::table::DpTable;
use pcp_core::{
    Constraints, CountSeries, CpdError, Diagnostics, ExecutionContext, OrderScore,
    SegmentEstimate, ValidatedConstraints, change_points_from_breakpoints, validate_constraints,
};
use pcp_costs::{PoissonRate, SegmentModel};
use std::borrow::Cow;
use std::mem::size_of;

const DEFAULT_CANCEL_CHECK_EVERY: usize = 1000;

/// How the table is populated.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EvaluationOrder {
    /// Resolve only the states reachable from each terminal cell.
    #[default]
    OnDemand,
    /// Fill every state in increasing end, then increasing change count.
    BottomUp,
}

impl EvaluationOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnDemand => "on_demand",
            Self::BottomUp => "bottom_up",
        }
    }
}

/// Configuration for [`MultiStep`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiStepConfig {
    pub evaluation: EvaluationOrder,
    pub cancel_check_every: usize,
    /// Keep the populated table in the result.
    pub retain_table: bool,
}

impl Default for MultiStepConfig {
    fn default() -> Self {
        Self {
            evaluation: EvaluationOrder::OnDemand,
            cancel_check_every: DEFAULT_CANCEL_CHECK_EVERY,
            retain_table: false,
        }
    }
}

impl MultiStepConfig {
    fn validate(&self) -> Result<(), CpdError> {
        if self.cancel_check_every == 0 {
            return Err(CpdError::invalid_input(
                "cancel_check_every must be >= 1; got 0",
            ));
        }
        Ok(())
    }
}

/// Output of one multi-step detection run.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct MultiStepResult {
    pub selected_change_count: usize,
    /// Ascending segment ends; the last entry is `n`.
    pub breakpoints: Vec<usize>,
    /// `breakpoints` without the terminal `n`.
    pub change_points: Vec<usize>,
    pub intensities: Vec<f64>,
    /// One entry per backtracked segment, in order. Neighbouring segments
    /// with equal intensity are reported separately, never merged.
    pub segments: Vec<SegmentEstimate>,
    pub order_scores: Vec<OrderScore>,
    pub log_likelihood_constant: f64,
    pub table: Option<DpTable>,
    pub diagnostics: Diagnostics,
}

impl MultiStepResult {
    pub fn selected_score(&self) -> &OrderScore {
        &self.order_scores[self.selected_change_count]
    }
}

/// Multi-step Poisson change-point detector with AIC order selection.
#[derive(Debug)]
pub struct MultiStep<M: SegmentModel> {
    model: M,
    config: MultiStepConfig,
}

impl<M: SegmentModel> MultiStep<M> {
    pub fn new(model: M, config: MultiStepConfig) -> Result<Self, CpdError> {
        config.validate()?;
        Ok(Self { model, config })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn config(&self) -> &MultiStepConfig {
        &self.config
    }

    fn estimate_run_bytes(
        &self,
        x: &CountSeries<'_>,
        validated: &ValidatedConstraints,
    ) -> Result<usize, CpdError> {
        let table_bytes = DpTable::estimated_bytes(x.n(), validated.max_change_count)?;
        let intensity_bytes = x
            .n()
            .checked_mul(size_of::<f64>())
            .ok_or_else(|| CpdError::resource_limit("intensity bytes overflow"))?;
        table_bytes
            .checked_add(self.model.worst_case_cache_bytes(x))
            .and_then(|bytes| bytes.checked_add(intensity_bytes))
            .ok_or_else(|| CpdError::resource_limit("multistep state bytes overflow"))
    }

    pub fn detect(
        &self,
        x: &CountSeries<'_>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<MultiStepResult, CpdError> {
        self.config.validate()?;
        let validated = validate_constraints(ctx.constraints, x.n())?;
        self.model.validate(x)?;

        let required_bytes = self.estimate_run_bytes(x, &validated)?;
        if let Some(limit_bytes) = validated.memory_budget_bytes
            && required_bytes > limit_bytes
        {
            return Err(CpdError::resource_limit(format!(
                "constraints.memory_budget_bytes exceeded for multistep state: required_bytes={required_bytes}, limit_bytes={limit_bytes}; increase constraints.memory_budget_bytes or reduce constraints.max_change_points"
            )));
        }

        let cache = self.model.precompute(x)?;
        let n = x.n();
        let max_change_count = validated.max_change_count;
        let candidate_orders = validated.candidate_orders();
        let evaluation = self.config.evaluation;

        let mut control = RunControl::new(ctx, self.config.cancel_check_every);
        let mut recursion = DpRecursion::new(&self.model, &cache, n, max_change_count)?;
        match evaluation {
            EvaluationOrder::OnDemand => {
                for change_count in 0..=max_change_count {
                    recursion.resolve(change_count, n, &mut control)?;
                    ctx.report_progress((change_count + 1) as f32 / candidate_orders as f32);
                }
            }
            EvaluationOrder::BottomUp => recursion.fill_bottom_up(&mut control)?,
        }

        let log_likelihood_constant = self
            .model
            .log_likelihood_constant(x, &mut |work| control.step_by(work))?;
        let selection = select_order(
            &terminal_log_likelihoods(recursion.table())?,
            log_likelihood_constant,
        )?;
        for score in &selection.scores {
            tracing::trace!(
                change_count = score.change_count,
                log_likelihood = score.log_likelihood,
                aic = score.aic,
                "scored candidate order"
            );
        }

        let selected_change_count = selection.selected_change_count;
        let reconstruction =
            reconstruct(&self.model, &cache, recursion.table(), selected_change_count)?;

        let stats = control.stats().clone();
        let runtime_ms =
            u64::try_from(control.started_at().elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut notes = vec![
            format!("evaluation={}", evaluation.as_str()),
            format!(
                "selected_change_count={selected_change_count}, aic={}",
                selection.selected().aic
            ),
            format!(
                "segment_evals={}, resolved_cells={}, max_pending_depth={}",
                stats.segment_evals, stats.resolved_cells, stats.max_pending_depth
            ),
        ];
        if let Some(cap) = ctx.constraints.max_change_points
            && cap < n - 1
        {
            notes.push(format!(
                "candidate change counts capped at {max_change_count} by constraints.max_change_points"
            ));
        }
        if x.is_all_zero() {
            notes.push("all counts are zero; every intensity is 0".to_string());
        }

        let mut warnings = vec![];
        if control.soft_budget_exceeded() {
            tracing::warn!(
                segment_evals = stats.segment_evals,
                runtime_ms,
                "budget exceeded under SoftDegrade mode; run continued"
            );
            warnings.push(
                "budget exceeded under SoftDegrade mode; run continued without algorithm fallback"
                    .to_string(),
            );
        }

        ctx.record_scalar("offline.multistep.segment_evals", stats.segment_evals as f64);
        ctx.record_scalar(
            "offline.multistep.resolved_cells",
            stats.resolved_cells as f64,
        );
        ctx.record_scalar(
            "offline.multistep.max_pending_depth",
            stats.max_pending_depth as f64,
        );
        ctx.record_scalar(
            "offline.multistep.selected_change_count",
            selected_change_count as f64,
        );
        ctx.record_scalar("offline.multistep.runtime_ms", runtime_ms as f64);
        ctx.report_progress(1.0);

        tracing::debug!(
            n,
            candidate_orders,
            selected_change_count,
            evaluation = evaluation.as_str(),
            segment_evals = stats.segment_evals,
            resolved_cells = stats.resolved_cells,
            runtime_ms,
            "multistep detection finished"
        );

        let diagnostics = Diagnostics {
            n,
            runtime_ms: Some(runtime_ms),
            notes,
            warnings,
            algorithm: Cow::Borrowed("multistep"),
            segment_model: Cow::Borrowed(self.model.name()),
            evaluation_order: Cow::Borrowed(evaluation.as_str()),
            candidate_orders,
            dp_stats: Some(stats),
            #[cfg(feature = "serde")]
            params_json: config_params_json(&self.config),
            ..Diagnostics::default()
        };

        let change_points = change_points_from_breakpoints(n, &reconstruction.breakpoints);
        let table = self.config.retain_table.then(|| recursion.into_table());

        Ok(MultiStepResult {
            selected_change_count,
            breakpoints: reconstruction.breakpoints,
            change_points,
            intensities: reconstruction.intensities,
            segments: reconstruction.segments,
            order_scores: selection.scores,
            log_likelihood_constant,
            table,
            diagnostics,
        })
    }
}

#[cfg(feature = "serde")]
fn config_params_json(config: &MultiStepConfig) -> Option<serde_json::Value> {
    serde_json::to_value(config).ok()
}

/// Runs [`MultiStep`] with the Poisson rate model and default settings.
pub fn detect_change(counts: &[u64]) -> Result<MultiStepResult, CpdError> {
    let series = CountSeries::new(counts)?;
    let constraints = Constraints::default();
    let ctx = ExecutionContext::new(&constraints);
    MultiStep::new(PoissonRate::new(), MultiStepConfig::default())?.detect(&series, &ctx)
}
