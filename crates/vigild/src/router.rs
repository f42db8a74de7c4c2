//! Loop-Back Router - bounded backward jumps
//!
//! Maps phase-exit outcomes to forward advancement or a backward jump to
//! the phase whose assumptions were invalidated. Every backward jump
//! increments a global counter capped at 3 for the whole investigation;
//! once the cap is reached, further backward requests are overridden into a
//! forward jump to Solution with a "root cause analysis incomplete" caveat.
//! That override is the engine's livelock-prevention mechanism.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vigil_common::{
    AuditKind, EngineConfig, InvestigationState, LoopBackReason, LoopBackRecord, Phase,
    PhaseCatalog,
};

// ============================================================================
// Outcomes and Decisions
// ============================================================================

/// How the current phase is being exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    /// Goal met; advance to the catalog successor.
    Completed,
    /// The line of hypotheses collapsed; regenerate.
    HypothesisRefuted,
    /// The blast-radius assessment no longer holds.
    ScopeChanged,
    /// The change timeline was wrong.
    TimelineWrong,
    /// Stay and gather more evidence.
    NeedMoreData,
    /// Stay; no movement this turn.
    Stalled,
    /// Stay, flagged for human hand-off.
    EscalationNeeded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    pub next_phase: Phase,
    pub is_loop_back: bool,
    pub message: String,
}

pub const RCA_INCOMPLETE_CAVEAT: &str = "root cause analysis incomplete";

// ============================================================================
// Router
// ============================================================================

#[derive(Debug, Clone)]
pub struct LoopBackRouter {
    catalog: PhaseCatalog,
    ceiling: u8,
}

impl LoopBackRouter {
    pub fn new(catalog: PhaseCatalog, config: &EngineConfig) -> Self {
        Self {
            catalog,
            ceiling: config.loop_back_ceiling,
        }
    }

    /// Route a phase-exit outcome. Backward jumps are recorded on the
    /// aggregate's audit trail and counted against the global ceiling;
    /// forward moves and stays are free.
    pub fn route(&self, outcome: PhaseOutcome, state: &mut InvestigationState) -> RouteDecision {
        let current = state.phase;
        match outcome {
            PhaseOutcome::Completed => {
                let next = self.catalog.next_ordinal_phase(current).unwrap_or(current);
                RouteDecision {
                    next_phase: next,
                    is_loop_back: false,
                    message: if next == current {
                        "terminal phase, staying".to_string()
                    } else {
                        format!("phase complete, advancing to {next}")
                    },
                }
            }
            PhaseOutcome::HypothesisRefuted => {
                self.backward(state, Phase::Hypothesis, LoopBackReason::HypothesisRefuted)
            }
            PhaseOutcome::ScopeChanged => {
                self.backward(state, Phase::BlastRadius, LoopBackReason::ScopeChanged)
            }
            PhaseOutcome::TimelineWrong => {
                self.backward(state, Phase::Timeline, LoopBackReason::TimelineWrong)
            }
            PhaseOutcome::NeedMoreData => RouteDecision {
                next_phase: current,
                is_loop_back: false,
                message: "staying to gather more evidence".to_string(),
            },
            PhaseOutcome::Stalled => RouteDecision {
                next_phase: current,
                is_loop_back: false,
                message: "no movement, staying in phase".to_string(),
            },
            PhaseOutcome::EscalationNeeded => {
                state.escalation.human_handoff = true;
                state.record_audit(AuditKind::EscalationFlagged, "human hand-off requested");
                warn!(case = %state.case_id, "investigation flagged for human hand-off");
                RouteDecision {
                    next_phase: current,
                    is_loop_back: false,
                    message: "flagged for human hand-off".to_string(),
                }
            }
        }
    }

    fn backward(
        &self,
        state: &mut InvestigationState,
        target: Phase,
        reason: LoopBackReason,
    ) -> RouteDecision {
        let current = state.phase;

        // A "backward" target at or ahead of the current phase is a stay,
        // not a loop-back (e.g. scope change reported from BlastRadius
        // itself).
        if target.ordinal() >= current.ordinal() {
            return RouteDecision {
                next_phase: current,
                is_loop_back: false,
                message: format!("already at or before {target}, staying"),
            };
        }

        if state.loop_back_count >= self.ceiling {
            // Ceiling hit: force forward to Solution instead.
            warn!(
                case = %state.case_id,
                requested = %target,
                "loop-back ceiling reached, forcing forward to solution"
            );
            state.loop_backs.push(LoopBackRecord {
                from: current,
                to: Phase::Solution,
                reason: LoopBackReason::CeilingForcedForward,
                turn: state.turn,
            });
            state.record_audit(
                AuditKind::ForcedForward,
                &format!("loop-back to {target} refused, {RCA_INCOMPLETE_CAVEAT}"),
            );
            if !state.caveats.iter().any(|c| c == RCA_INCOMPLETE_CAVEAT) {
                state.caveats.push(RCA_INCOMPLETE_CAVEAT.to_string());
            }
            return RouteDecision {
                next_phase: Phase::Solution,
                is_loop_back: false,
                message: format!("loop-back ceiling reached, {RCA_INCOMPLETE_CAVEAT}"),
            };
        }

        state.loop_back_count += 1;
        state.loop_backs.push(LoopBackRecord {
            from: current,
            to: target,
            reason,
            turn: state.turn,
        });
        state.record_audit(
            AuditKind::LoopBack,
            &format!("{current} -> {target} ({reason:?})"),
        );
        info!(
            case = %state.case_id,
            from = %current,
            to = %target,
            count = state.loop_back_count,
            "loop-back"
        );
        RouteDecision {
            next_phase: target,
            is_loop_back: true,
            message: format!("looping back to {target}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
