//! Engine configuration.
//!
//! One explicit struct, constructed at process start and passed by reference
//! into each component. No process-wide singletons: a test can run two engines
//! with different thresholds side by side.

use serde::{Deserialize, Serialize};

/// Tunable thresholds for the investigation engine.
///
/// `Default` is the production configuration; tests override individual
/// fields when they need to provoke a boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Multiplier applied to a testing hypothesis's likelihood for each
    /// iteration it fails to progress.
    pub decay_factor: f64,

    /// Decay never drives likelihood below this floor (and never to zero).
    pub decay_floor: f64,

    /// Likelihood at or above which a hypothesis auto-promotes to Validated.
    pub validation_threshold: f64,

    /// Likelihood below which a testing hypothesis auto-demotes to Refuted.
    pub refutation_threshold: f64,

    /// Number of same-category testing hypotheses that counts as anchoring.
    pub anchoring_saturation: usize,

    /// Iterations without progress before a hypothesis counts as stalled.
    pub stall_threshold: u32,

    /// Likelihood above which a stalled hypothesis counts as a persistent
    /// high-confidence failure.
    pub high_confidence_threshold: f64,

    /// Turns without progress on the leading hypothesis before momentum
    /// is Blocked.
    pub blocked_momentum_turns: u64,

    /// Supporting-evidence count that maps to completeness 1.0.
    pub evidence_cap: u32,

    /// Evidence completeness below this, combined with blocked momentum,
    /// triggers degraded mode.
    pub low_evidence_completeness: f64,

    /// Maximum backward phase jumps for the whole investigation.
    pub loop_back_ceiling: u8,

    /// In degraded mode, solution entry opens once confidence is within
    /// this margin of the active cap.
    pub solution_proceed_margin: f64,

    /// Token budget handed to the context compressor when assembling the
    /// prompt summary.
    pub context_summary_tokens: usize,

    /// Maximum hypotheses offered for testing per turn.
    pub max_testable_hypotheses: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decay_factor: 0.85,
            decay_floor: 0.01,
            validation_threshold: 0.70,
            refutation_threshold: 0.30,
            anchoring_saturation: 4,
            stall_threshold: 3,
            high_confidence_threshold: 0.80,
            blocked_momentum_turns: 6,
            evidence_cap: 5,
            low_evidence_completeness: 0.40,
            loop_back_ceiling: 3,
            solution_proceed_margin: 0.05,
            context_summary_tokens: 1024,
            max_testable_hypotheses: 3,
        }
    }
}
