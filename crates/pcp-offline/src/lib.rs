// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod multistep;
pub mod reconstruct;
pub mod recursion;
pub mod selection;
pub mod table;

pub use multistep::{EvaluationOrder, MultiStep, MultiStepConfig, MultiStepResult, detect_change};
pub use reconstruct::{Reconstruction, backtrack_breakpoints, reconstruct};
pub use recursion::{DpRecursion, RunControl};
pub use selection::{OrderSelection, parameter_count, select_order, terminal_log_likelihoods};
pub use table::{DpCell, DpTable, is_valid_state};
