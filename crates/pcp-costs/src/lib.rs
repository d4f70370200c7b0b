// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

pub mod model;
pub mod poisson;

pub use model::SegmentModel;
pub use poisson::{
    LOG_FACTORIAL_POLL_CHUNK, PoissonCache, PoissonRate, log_likelihood_constant,
    segment_log_likelihood, segment_mle,
};
