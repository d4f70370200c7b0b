// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use std::borrow::Cow;

/// Diagnostics schema version for change-point run metadata.
pub const DIAGNOSTICS_SCHEMA_VERSION: u32 = 1;

/// Work counters for the dynamic-programming stage of a run.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DpStats {
    /// Table cells written during the run.
    pub resolved_cells: usize,
    /// Segment log-likelihood evaluations.
    pub segment_evals: usize,
    /// Deepest pending-work stack reached by on-demand evaluation.
    pub max_pending_depth: usize,
}

/// Structured diagnostics captured from a detector execution.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostics {
    pub n: usize,
    pub schema_version: u32,
    pub engine_version: Option<String>,
    pub runtime_ms: Option<u64>,
    pub notes: Vec<String>,
    pub warnings: Vec<String>,
    pub algorithm: Cow<'static, str>,
    pub segment_model: Cow<'static, str>,
    pub evaluation_order: Cow<'static, str>,
    pub candidate_orders: usize,
    #[cfg(feature = "serde")]
    pub params_json: Option<serde_json::Value>,
    pub dp_stats: Option<DpStats>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            n: 0,
            schema_version: DIAGNOSTICS_SCHEMA_VERSION,
            engine_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            runtime_ms: None,
            notes: vec![],
            warnings: vec![],
            algorithm: Cow::Borrowed(""),
            segment_model: Cow::Borrowed(""),
            evaluation_order: Cow::Borrowed(""),
            candidate_orders: 0,
            #[cfg(feature = "serde")]
            params_json: None,
            dp_stats: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DIAGNOSTICS_SCHEMA_VERSION, Diagnostics, DpStats};
    use std::borrow::Cow;

    #[test]
    fn diagnostics_default_sets_schema_and_engine_version() {
        let diagnostics = Diagnostics::default();
        assert_eq!(diagnostics.schema_version, DIAGNOSTICS_SCHEMA_VERSION);
        assert_eq!(
            diagnostics.engine_version,
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn diagnostics_default_sets_expected_empty_and_none_fields() {
        let diagnostics = Diagnostics::default();
        assert_eq!(diagnostics.n, 0);
        assert_eq!(diagnostics.algorithm, Cow::Borrowed(""));
        assert_eq!(diagnostics.segment_model, Cow::Borrowed(""));
        assert_eq!(diagnostics.evaluation_order, Cow::Borrowed(""));
        assert_eq!(diagnostics.candidate_orders, 0);
        assert!(diagnostics.runtime_ms.is_none());
        assert!(diagnostics.notes.is_empty());
        assert!(diagnostics.warnings.is_empty());
        assert!(diagnostics.dp_stats.is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn diagnostics_serde_roundtrip_preserves_all_fields() {
        let diagnostics = Diagnostics {
            n: 20,
            schema_version: DIAGNOSTICS_SCHEMA_VERSION,
            engine_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            runtime_ms: Some(3),
            notes: vec!["selected_change_count=1".to_string()],
            warnings: vec![],
            algorithm: Cow::Owned("multistep".to_string()),
            segment_model: Cow::Owned("poisson_rate".to_string()),
            evaluation_order: Cow::Owned("on_demand".to_string()),
            candidate_orders: 20,
            params_json: Some(serde_json::json!({
                "evaluation": "OnDemand",
                "cancel_check_every": 1000
            })),
            dp_stats: Some(DpStats {
                resolved_cells: 210,
                segment_evals: 400,
                max_pending_depth: 21,
            }),
        };

        let encoded = serde_json::to_string(&diagnostics).expect("diagnostics should serialize");
        let decoded: Diagnostics =
            serde_json::from_str(&encoded).expect("diagnostics should deserialize");
        assert_eq!(decoded, diagnostics);
    }
}
