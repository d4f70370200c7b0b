// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use pcp_core::{Constraints, CountSeries, ExecutionContext, validate_breakpoints};
use pcp_costs::PoissonRate;
use pcp_offline::{EvaluationOrder, MultiStep, MultiStepConfig};

const MAX_LEN: usize = 192;

fuzz_target!(|data: &[u8]| {
    let Some((&header, body)) = data.split_first() else {
        return;
    };

    let counts: Vec<u64> = body
        .iter()
        .take(MAX_LEN)
        .map(|&byte| {
            if byte >= 0xf0 {
                u64::from(byte) * 1_000
            } else {
                u64::from(byte % 32)
            }
        })
        .collect();

    let Ok(series) = CountSeries::new(&counts) else {
        return;
    };

    let evaluation = if header & 1 == 0 {
        EvaluationOrder::OnDemand
    } else {
        EvaluationOrder::BottomUp
    };
    let max_change_points = if header & 2 == 0 {
        None
    } else {
        Some(usize::from(header >> 4))
    };
    let constraints = Constraints {
        max_change_points,
        ..Constraints::default()
    };
    let ctx = ExecutionContext::new(&constraints);

    let detector = MultiStep::new(
        PoissonRate,
        MultiStepConfig {
            evaluation,
            cancel_check_every: 1 + usize::from(header >> 2),
            retain_table: header & 4 != 0,
        },
    )
    .expect("fuzz config must be valid");

    if let Ok(result) = detector.detect(&series, &ctx) {
        assert!(validate_breakpoints(counts.len(), &result.breakpoints).is_ok());
        assert_eq!(result.breakpoints.len(), result.selected_change_count + 1);
        assert_eq!(result.intensities.len(), counts.len());
        assert!(result.intensities.iter().all(|rate| rate.is_finite() && *rate >= 0.0));
    }
});
