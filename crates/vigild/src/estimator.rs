//! Conclusion Estimator - working conclusion and degraded mode
//!
//! Recomputes the case's best current root-cause statement plus a confidence
//! estimate every turn, in place of binary stalled/not-stalled detection.
//! Also decides when the investigation must degrade its confidence claims
//! and whether solution-phase entry is currently permitted.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vigil_common::{
    ConfidenceLevel, DegradedModeType, EngineConfig, InvestigationState, WorkingConclusion,
};

// ============================================================================
// Progress Metrics
// ============================================================================

/// Momentum bands over recent progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Momentum {
    /// Progress this turn or last.
    High,
    Medium,
    Low,
    /// No progress on the leading hypothesis for too long.
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressMetrics {
    pub momentum: Momentum,
    pub turns_since_progress: u64,
    /// 0..1 score from supporting-evidence count, saturating at the cap.
    pub evidence_completeness: f64,
}

/// Confidence assumed when no hypothesis leads yet, by phase ordinal.
/// Early phases stay well under the speculation bar.
const PHASE_DEFAULT_CONFIDENCE: [f64; 7] = [0.10, 0.25, 0.35, 0.40, 0.45, 0.45, 0.45];

// ============================================================================
// Estimator
// ============================================================================

#[derive(Debug, Clone)]
pub struct ConclusionEstimator {
    config: EngineConfig,
}

impl ConclusionEstimator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn progress_metrics(&self, state: &InvestigationState) -> ProgressMetrics {
        // Progress on the leading hypothesis and progress recorded by the
        // tactical loop (evidence-only turns included) both keep momentum
        // alive; read whichever is fresher.
        let iteration_progress = state.last_progress_turn();
        let turns_since_progress = match state.leading_hypothesis() {
            Some(h) => {
                let last = iteration_progress
                    .map_or(h.last_progress_turn, |t| t.max(h.last_progress_turn));
                state.turn.saturating_sub(last)
            }
            None => match iteration_progress {
                Some(t) => state.turn.saturating_sub(t),
                None => state.turn,
            },
        };

        let momentum = if turns_since_progress >= self.config.blocked_momentum_turns {
            Momentum::Blocked
        } else if turns_since_progress <= 1 {
            Momentum::High
        } else if turns_since_progress <= 3 {
            Momentum::Medium
        } else {
            Momentum::Low
        };

        let supporting = state
            .leading_hypothesis()
            .map(|h| h.supporting_evidence.len() as u32)
            .unwrap_or(0);
        let evidence_completeness =
            supporting.min(self.config.evidence_cap) as f64 / self.config.evidence_cap as f64;

        ProgressMetrics {
            momentum,
            turns_since_progress,
            evidence_completeness,
        }
    }

    /// Build the working conclusion for this turn.
    ///
    /// Confidence derives from the leading hypothesis when one exists, else
    /// from the phase default; an active degraded mode clamps it to the
    /// mode's cap.
    pub fn generate_working_conclusion(
        &self,
        state: &InvestigationState,
        turn: u64,
    ) -> WorkingConclusion {
        let leading = state.leading_hypothesis();
        let (statement, mut confidence, supporting) = match leading {
            Some(h) => (
                h.statement.clone(),
                h.likelihood,
                h.supporting_evidence.len() as u32,
            ),
            None => (
                "no leading root-cause hypothesis yet".to_string(),
                PHASE_DEFAULT_CONFIDENCE[state.phase.ordinal()],
                0,
            ),
        };

        let mut caveats = state.caveats.clone();
        let cap = state.escalation.confidence_cap();
        if let Some(cap) = cap {
            if confidence > cap {
                debug!(case = %state.case_id, confidence, cap, "clamping confidence to degraded cap");
                confidence = cap;
            }
            if let Some(mode) = state.escalation.degraded_mode_type {
                caveats.push(format!(
                    "confidence capped at {:.0}%: {}",
                    cap * 100.0,
                    mode.description()
                ));
            }
        }

        let can_proceed_to_solution = match cap {
            Some(cap) => confidence >= cap - self.config.solution_proceed_margin,
            None => confidence >= self.config.validation_threshold,
        };

        WorkingConclusion {
            statement,
            confidence,
            confidence_level: ConfidenceLevel::from_confidence(confidence),
            supporting_evidence_count: supporting,
            caveats,
            can_proceed_to_solution,
            turn,
        }
    }

    /// Whether the investigation should enter degraded mode this turn.
    ///
    /// Returns the mode and a reason; callers apply it to the aggregate.
    /// Already-degraded investigations never re-trigger.
    pub fn should_enter_degraded_mode(
        &self,
        state: &InvestigationState,
    ) -> Option<(DegradedModeType, String)> {
        if state.escalation.operating_in_degraded_mode {
            return None;
        }

        if state.loop_back_count >= self.config.loop_back_ceiling {
            warn!(case = %state.case_id, "hypothesis space exhausted, degrading");
            return Some((
                DegradedModeType::HypothesisSpaceExhausted,
                format!(
                    "loop-back ceiling of {} reached without a validated hypothesis",
                    self.config.loop_back_ceiling
                ),
            ));
        }

        let metrics = self.progress_metrics(state);
        if metrics.momentum == Momentum::Blocked
            && metrics.evidence_completeness < self.config.low_evidence_completeness
        {
            warn!(
                case = %state.case_id,
                turns_since_progress = metrics.turns_since_progress,
                completeness = metrics.evidence_completeness,
                "blocked with thin evidence, degrading"
            );
            return Some((
                DegradedModeType::CriticalEvidenceMissing,
                format!(
                    "no progress for {} turns with evidence completeness {:.2}",
                    metrics.turns_since_progress, metrics.evidence_completeness
                ),
            ));
        }

        None
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use vigil_common::{
        EscalationState, HypothesisCategory, HypothesisLedger, HypothesisStatus,
        InvestigationState, Phase,
    };

    fn estimator() -> ConclusionEstimator {
        ConclusionEstimator::new(EngineConfig::default())
    }

    fn state_with_leading(likelihood: f64, supporting: usize) -> InvestigationState {
        let ledger = HypothesisLedger::new(EngineConfig::default());
        let mut state = InvestigationState::new("case-est");
        state.turn = 10;
        let mut h = ledger.create("bad deploy", HypothesisCategory::Code, likelihood, 10);
        h.status = HypothesisStatus::Testing;
        h.last_progress_turn = 10;
        for i in 0..supporting {
            h.supporting_evidence.push(format!("ev-{i}"));
        }
        state.hypotheses.push(h);
        state
    }

    #[test]
    fn test_momentum_bands() {
        let estimator = estimator();
        let mut state = state_with_leading(0.6, 0);

        state.hypotheses[0].last_progress_turn = 10;
        assert_eq!(estimator.progress_metrics(&state).momentum, Momentum::High);

        state.hypotheses[0].last_progress_turn = 8;
        assert_eq!(estimator.progress_metrics(&state).momentum, Momentum::Medium);

        state.hypotheses[0].last_progress_turn = 5;
        assert_eq!(estimator.progress_metrics(&state).momentum, Momentum::Low);

        state.hypotheses[0].last_progress_turn = 4;
        assert_eq!(estimator.progress_metrics(&state).momentum, Momentum::Blocked);
    }

    fn iteration_with_evidence(turn: u64) -> vigil_common::OodaIteration {
        vigil_common::OodaIteration {
            number: 1,
            phase: Phase::Validation,
            steps_completed: Vec::new(),
            evidence_collected: 1,
            hypotheses_tested: Vec::new(),
            confidence_changed: false,
            insights: None,
            turn,
        }
    }

    #[test]
    fn test_iteration_progress_counts_toward_momentum() {
        let estimator = estimator();
        let mut state = state_with_leading(0.6, 0);
        // The leading hypothesis last moved long ago, but this turn's
        // iteration collected evidence.
        state.hypotheses[0].last_progress_turn = 2;
        state.iterations.push(iteration_with_evidence(10));

        let metrics = estimator.progress_metrics(&state);
        assert_eq!(metrics.momentum, Momentum::High);
        assert_eq!(metrics.turns_since_progress, 0);
    }

    #[test]
    fn test_evidence_only_progress_prevents_degraded_entry() {
        let estimator = estimator();
        let mut state = state_with_leading(0.6, 0);
        state.hypotheses[0].last_progress_turn = 2;
        state.iterations.push(iteration_with_evidence(9));
        assert!(estimator.should_enter_degraded_mode(&state).is_none());
    }

    #[test]
    fn test_evidence_completeness_saturates() {
        let estimator = estimator();
        let state = state_with_leading(0.6, 3);
        assert_relative_eq!(
            estimator.progress_metrics(&state).evidence_completeness,
            0.6
        );
        let state = state_with_leading(0.6, 8);
        assert_relative_eq!(
            estimator.progress_metrics(&state).evidence_completeness,
            1.0
        );
    }

    #[test]
    fn test_conclusion_from_leading_hypothesis() {
        let estimator = estimator();
        let state = state_with_leading(0.75, 4);
        let conclusion = estimator.generate_working_conclusion(&state, 10);
        assert_eq!(conclusion.statement, "bad deploy");
        assert_relative_eq!(conclusion.confidence, 0.75);
        assert_eq!(conclusion.confidence_level, ConfidenceLevel::Confident);
        assert_eq!(conclusion.supporting_evidence_count, 4);
        assert!(conclusion.can_proceed_to_solution);
    }

    #[test]
    fn test_phase_defaults_stay_speculative_early() {
        let estimator = estimator();
        let mut state = InvestigationState::new("case-default");
        for phase in [Phase::Intake, Phase::BlastRadius, Phase::Timeline] {
            state.enter_phase(phase);
            let conclusion = estimator.generate_working_conclusion(&state, 1);
            assert!(
                conclusion.confidence < 0.50,
                "{phase} default must stay under the speculation bar"
            );
            assert_eq!(conclusion.confidence_level, ConfidenceLevel::Speculation);
        }
    }

    #[test]
    fn test_cannot_proceed_below_threshold_in_normal_mode() {
        let estimator = estimator();
        let state = state_with_leading(0.69, 2);
        let conclusion = estimator.generate_working_conclusion(&state, 10);
        assert!(!conclusion.can_proceed_to_solution);
    }

    #[test]
    fn test_degraded_cap_clamps_confidence() {
        let estimator = estimator();
        let mut state = state_with_leading(0.85, 3);
        state.escalation = EscalationState {
            operating_in_degraded_mode: true,
            degraded_mode_type: Some(DegradedModeType::ExpertiseRequired),
            entered_turn: Some(9),
            human_handoff: false,
        };
        let conclusion = estimator.generate_working_conclusion(&state, 10);
        assert_relative_eq!(conclusion.confidence, 0.40);
        assert!(conclusion.caveats.iter().any(|c| c.contains("capped")));
        // Within the margin of the cap: solution entry opens.
        assert!(conclusion.can_proceed_to_solution);
    }

    #[test]
    fn test_degraded_proceed_margin() {
        let estimator = estimator();
        let mut state = state_with_leading(0.30, 1);
        state.escalation = EscalationState {
            operating_in_degraded_mode: true,
            degraded_mode_type: Some(DegradedModeType::ExpertiseRequired),
            entered_turn: Some(9),
            human_handoff: false,
        };
        // 0.30 is below 0.40 - 0.05.
        let conclusion = estimator.generate_working_conclusion(&state, 10);
        assert!(!conclusion.can_proceed_to_solution);

        state.hypotheses[0].likelihood = 0.36;
        let conclusion = estimator.generate_working_conclusion(&state, 10);
        assert!(conclusion.can_proceed_to_solution);
    }

    #[test]
    fn test_exhausted_space_cap_is_zero() {
        let estimator = estimator();
        let mut state = state_with_leading(0.6, 2);
        state.escalation = EscalationState {
            operating_in_degraded_mode: true,
            degraded_mode_type: Some(DegradedModeType::HypothesisSpaceExhausted),
            entered_turn: Some(9),
            human_handoff: false,
        };
        let conclusion = estimator.generate_working_conclusion(&state, 10);
        assert_relative_eq!(conclusion.confidence, 0.0);
        // Cap zero: proceeding is always permitted, that is the escape hatch.
        assert!(conclusion.can_proceed_to_solution);
    }

    #[test]
    fn test_degraded_entry_on_loop_ceiling() {
        let estimator = estimator();
        let mut state = state_with_leading(0.6, 2);
        state.loop_back_count = 3;
        let (mode, _reason) = estimator.should_enter_degraded_mode(&state).unwrap();
        assert_eq!(mode, DegradedModeType::HypothesisSpaceExhausted);
    }

    #[test]
    fn test_degraded_entry_on_blocked_thin_evidence() {
        let estimator = estimator();
        let mut state = state_with_leading(0.6, 1);
        state.hypotheses[0].last_progress_turn = 2; // 8 turns ago
        let (mode, _reason) = estimator.should_enter_degraded_mode(&state).unwrap();
        assert_eq!(mode, DegradedModeType::CriticalEvidenceMissing);
    }

    #[test]
    fn test_blocked_with_solid_evidence_does_not_degrade() {
        let estimator = estimator();
        let mut state = state_with_leading(0.6, 5);
        state.hypotheses[0].last_progress_turn = 2;
        assert!(estimator.should_enter_degraded_mode(&state).is_none());
    }

    #[test]
    fn test_no_retrigger_once_degraded() {
        let estimator = estimator();
        let mut state = state_with_leading(0.6, 0);
        state.loop_back_count = 3;
        state.escalation.operating_in_degraded_mode = true;
        state.escalation.degraded_mode_type = Some(DegradedModeType::GeneralLimitation);
        assert!(estimator.should_enter_degraded_mode(&state).is_none());
    }
}
