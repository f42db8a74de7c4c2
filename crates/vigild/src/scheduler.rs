//! Step Scheduler - adaptive intensity controller
//!
//! Decides which OODA steps run in the current iteration and how deep the
//! iteration goes. Intensity is a pure function of phase and 1-based
//! iteration count: survey phases stay light, Validation and Hypothesis ramp
//! from medium to full once the easy answers are exhausted, Intake runs no
//! tactical loop at all.
//!
//! This component never errors; it only classifies.

use serde::{Deserialize, Serialize};
use tracing::debug;

use vigil_common::{InvestigationState, OodaIteration, OodaStep, Phase, PhaseCatalog};

// ============================================================================
// Intensity
// ============================================================================

/// How deep one iteration of the tactical loop goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationIntensity {
    /// No tactical loop this phase.
    None,
    /// Required steps only.
    Light,
    /// Required steps plus the weightier optional ones.
    Medium,
    /// Every permitted step.
    Full,
}

/// Optional steps below this normalized weight are skipped at medium
/// intensity.
const MEDIUM_OPTIONAL_WEIGHT: f64 = 0.15;

/// Iteration count after which ramping phases move from medium to full.
const RAMP_AFTER_ITERATIONS: u32 = 2;

// ============================================================================
// Iteration Result
// ============================================================================

/// Classification of a completed iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationResult {
    pub made_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stall_reason: Option<String>,
}

// ============================================================================
// Step Scheduler
// ============================================================================

#[derive(Debug, Clone)]
pub struct StepScheduler {
    catalog: PhaseCatalog,
}

impl StepScheduler {
    pub fn new(catalog: PhaseCatalog) -> Self {
        Self { catalog }
    }

    /// Iteration depth for a phase at a 1-based iteration count.
    ///
    /// Intake runs none; BlastRadius, Timeline and Document are always
    /// light; Solution is always medium; Hypothesis and Validation are
    /// medium for the first two iterations and full from the third.
    pub fn intensity(phase: Phase, iteration_index: u32) -> IterationIntensity {
        match phase {
            Phase::Intake => IterationIntensity::None,
            Phase::BlastRadius | Phase::Timeline | Phase::Document => IterationIntensity::Light,
            Phase::Solution => IterationIntensity::Medium,
            Phase::Hypothesis | Phase::Validation => {
                if iteration_index <= RAMP_AFTER_ITERATIONS {
                    IterationIntensity::Medium
                } else {
                    IterationIntensity::Full
                }
            }
        }
    }

    /// Steps that run for a phase at a given intensity, required first,
    /// forbidden never.
    pub fn steps_for(&self, phase: Phase, intensity: IterationIntensity) -> Vec<OodaStep> {
        match intensity {
            IterationIntensity::None => Vec::new(),
            IterationIntensity::Light => self.catalog.required_steps(phase),
            IterationIntensity::Medium => {
                let weights = self.catalog.weights(phase);
                let mut steps = self.catalog.required_steps(phase);
                steps.extend(
                    self.catalog
                        .optional_steps(phase)
                        .into_iter()
                        .filter(|s| weights.normalized(*s) >= MEDIUM_OPTIONAL_WEIGHT),
                );
                steps
            }
            IterationIntensity::Full => {
                let mut steps = self.catalog.required_steps(phase);
                steps.extend(self.catalog.optional_steps(phase));
                steps
            }
        }
    }

    /// Allocate the next iteration for the current phase and seed it empty.
    /// The per-phase counter was reset when the phase was entered.
    pub fn start_iteration(&self, state: &mut InvestigationState) -> OodaIteration {
        state.phase_iteration += 1;
        debug!(
            case = %state.case_id,
            phase = %state.phase,
            iteration = state.phase_iteration,
            "starting iteration"
        );
        OodaIteration {
            number: state.phase_iteration,
            phase: state.phase,
            steps_completed: Vec::new(),
            evidence_collected: 0,
            hypotheses_tested: Vec::new(),
            confidence_changed: false,
            insights: None,
            turn: state.turn,
        }
    }

    /// Classify a finished iteration: progress, or a stall with a reason.
    pub fn complete_iteration(
        &self,
        state: &InvestigationState,
        iteration: &OodaIteration,
    ) -> IterationResult {
        if iteration.made_progress() {
            return IterationResult {
                made_progress: true,
                stall_reason: None,
            };
        }
        let reason = if state.hypotheses.iter().any(|h| h.is_in_play()) {
            "no new evidence, no confidence movement, no hypotheses tested".to_string()
        } else {
            "no hypotheses in play and no new evidence".to_string()
        };
        debug!(
            case = %state.case_id,
            iteration = iteration.number,
            reason = %reason,
            "iteration stalled"
        );
        IterationResult {
            made_progress: false,
            stall_reason: Some(reason),
        }
    }
}

impl Default for StepScheduler {
    fn default() -> Self {
        Self::new(PhaseCatalog::standard())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intensity_table() {
        assert_eq!(StepScheduler::intensity(Phase::Intake, 1), IterationIntensity::None);
        assert_eq!(StepScheduler::intensity(Phase::BlastRadius, 4), IterationIntensity::Light);
        assert_eq!(StepScheduler::intensity(Phase::Timeline, 1), IterationIntensity::Light);
        assert_eq!(StepScheduler::intensity(Phase::Document, 2), IterationIntensity::Light);
        assert_eq!(StepScheduler::intensity(Phase::Solution, 7), IterationIntensity::Medium);
    }

    #[test]
    fn test_validation_ramps_to_full() {
        assert_eq!(StepScheduler::intensity(Phase::Validation, 1), IterationIntensity::Medium);
        assert_eq!(StepScheduler::intensity(Phase::Validation, 2), IterationIntensity::Medium);
        assert_eq!(StepScheduler::intensity(Phase::Validation, 3), IterationIntensity::Full);
        assert_eq!(StepScheduler::intensity(Phase::Hypothesis, 3), IterationIntensity::Full);
    }

    #[test]
    fn test_steps_never_include_forbidden() {
        let scheduler = StepScheduler::default();
        // Solution forbids Observe at any intensity.
        for intensity in [
            IterationIntensity::Light,
            IterationIntensity::Medium,
            IterationIntensity::Full,
        ] {
            let steps = scheduler.steps_for(Phase::Solution, intensity);
            assert!(!steps.contains(&OodaStep::Observe), "{intensity:?}");
        }
    }

    #[test]
    fn test_full_intensity_runs_all_permitted() {
        let scheduler = StepScheduler::default();
        let steps = scheduler.steps_for(Phase::Validation, IterationIntensity::Full);
        assert!(steps.contains(&OodaStep::Observe));
        assert!(steps.contains(&OodaStep::Orient));
        assert!(steps.contains(&OodaStep::Decide));
        assert!(steps.contains(&OodaStep::Act));
    }

    #[test]
    fn test_iteration_numbers_reset_on_phase_change() {
        let scheduler = StepScheduler::default();
        let mut state = InvestigationState::new("case-sched");
        state.enter_phase(Phase::Validation);

        let first = scheduler.start_iteration(&mut state);
        let second = scheduler.start_iteration(&mut state);
        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);

        state.enter_phase(Phase::Solution);
        let after_change = scheduler.start_iteration(&mut state);
        assert_eq!(after_change.number, 1);
    }

    #[test]
    fn test_complete_iteration_classifies_progress() {
        let scheduler = StepScheduler::default();
        let mut state = InvestigationState::new("case-prog");
        state.enter_phase(Phase::Validation);

        let mut iteration = scheduler.start_iteration(&mut state);
        let result = scheduler.complete_iteration(&state, &iteration);
        assert!(!result.made_progress);
        assert!(result.stall_reason.is_some());

        iteration.evidence_collected = 1;
        let result = scheduler.complete_iteration(&state, &iteration);
        assert!(result.made_progress);
        assert!(result.stall_reason.is_none());
    }
}
