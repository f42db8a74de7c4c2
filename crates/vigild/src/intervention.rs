//! Intervention Coordinator - priority arbitration
//!
//! When the step machinery and the hypothesis ledger both want to act, the
//! coordinator picks exactly one intervention per turn by fixed priority:
//! phase completion (70) is checked and returned before anchoring
//! correction (60). The orchestrator therefore never receives conflicting
//! directives.

use serde::{Deserialize, Serialize};
use tracing::debug;

use vigil_common::{EngineConfig, HypothesisLedger, HypothesisStatus, InvestigationState, Phase};

// ============================================================================
// Intervention Plan
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    /// The current phase's goal is met; advance.
    PhaseCompletion,
    /// Anchoring detected; force hypothesis diversification.
    AnchoringPrevention,
}

pub const PRIORITY_PHASE_COMPLETION: u8 = 70;
pub const PRIORITY_ANCHORING_PREVENTION: u8 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionPlan {
    pub kind: InterventionKind,
    pub priority: u8,
    pub reason: String,
}

// ============================================================================
// Coordinator
// ============================================================================

#[derive(Debug, Clone)]
pub struct InterventionCoordinator {
    ledger: HypothesisLedger,
}

impl InterventionCoordinator {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            ledger: HypothesisLedger::new(config),
        }
    }

    /// At most one plan per turn; None means normal step execution proceeds.
    pub fn decide(&self, state: &InvestigationState) -> Option<InterventionPlan> {
        if let Some(reason) = self.phase_goal_met(state) {
            debug!(case = %state.case_id, phase = %state.phase, "phase completion intervention");
            return Some(InterventionPlan {
                kind: InterventionKind::PhaseCompletion,
                priority: PRIORITY_PHASE_COMPLETION,
                reason,
            });
        }

        let check = self
            .ledger
            .detect_anchoring(&state.hypotheses, state.phase_iteration);
        if check.triggered {
            let reason = check
                .reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "anchoring detected".to_string());
            debug!(case = %state.case_id, reason = %reason, "anchoring intervention");
            return Some(InterventionPlan {
                kind: InterventionKind::AnchoringPrevention,
                priority: PRIORITY_ANCHORING_PREVENTION,
                reason,
            });
        }

        None
    }

    /// Whether the current phase's exit goal is satisfied. Goals come from
    /// structured collaborator output integrated into the aggregate, except
    /// Hypothesis and Validation which read the ledger directly.
    fn phase_goal_met(&self, state: &InvestigationState) -> Option<String> {
        match state.phase {
            Phase::Intake => state
                .goals
                .anomaly_frame
                .as_ref()
                .map(|_| "anomaly frame captured".to_string()),
            Phase::BlastRadius => state
                .goals
                .scope_assessed
                .then(|| "scope assessed".to_string()),
            Phase::Timeline => state
                .goals
                .timeline_established
                .then(|| "timeline established".to_string()),
            Phase::Hypothesis => state
                .hypotheses
                .iter()
                .any(|h| h.status == HypothesisStatus::Testing)
                .then(|| "testable hypotheses available".to_string()),
            Phase::Validation => self
                .ledger
                .validated(&state.hypotheses)
                .map(|h| format!("hypothesis validated: {}", h.statement)),
            Phase::Solution => state
                .goals
                .solution_proposed
                .then(|| "solution proposed".to_string()),
            // Terminal: nothing to complete into.
            Phase::Document => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
