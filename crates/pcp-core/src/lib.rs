// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod constraints;
pub mod control;
pub mod diagnostics;
pub mod error;
pub mod execution_context;
pub mod observability;
pub mod results;
pub mod series;

pub use constraints::{Constraints, ValidatedConstraints, validate_constraints};
pub use control::{BudgetMode, BudgetStatus, CancelToken};
pub use diagnostics::{DIAGNOSTICS_SCHEMA_VERSION, Diagnostics, DpStats};
pub use error::CpdError;
pub use execution_context::ExecutionContext;
pub use observability::{NoopProgressSink, NoopTelemetrySink, ProgressSink, TelemetrySink};
pub use results::{
    OrderScore, SegmentEstimate, change_points_from_breakpoints, segments_from_breakpoints,
    validate_breakpoints,
};
pub use series::{
    CountSeries, INTEGER_TOL, counts_from_f64, counts_from_i64, counts_from_sentinel_prefixed,
};
