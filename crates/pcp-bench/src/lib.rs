// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Shared inputs for the benchmark targets.

fn lcg_next(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state
}

/// Piecewise-constant counts: `regimes` equal-length blocks whose base rates
/// cycle through `rates`, with a small deterministic jitter per observation.
pub fn regime_counts(n: usize, regimes: usize, rates: &[u64]) -> Vec<u64> {
    let regimes = regimes.max(1);
    let block = n.div_ceil(regimes).max(1);
    let mut state = 0xfeed_f00d_dead_beef_u64;
    (0..n)
        .map(|t| {
            let rate = rates.get((t / block) % rates.len().max(1)).copied().unwrap_or(0);
            rate + lcg_next(&mut state) % 3
        })
        .collect()
}

/// Random half-open segment queries over `[0, n)`.
pub fn segment_queries(n: usize, count: usize) -> Vec<(usize, usize)> {
    let mut state = 0x0dd_ba11_cafe_f00d_u64;
    (0..count)
        .map(|_| {
            let a = (lcg_next(&mut state) as usize) % n;
            let b = (lcg_next(&mut state) as usize) % n;
            (a.min(b), a.max(b) + 1)
        })
        .collect()
}
