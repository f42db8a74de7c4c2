//! Investigation State - the aggregate root for one case
//!
//! Owned by one case (never by a chat session), created once at Intake,
//! mutated every turn by the orchestrator, never destroyed. Exactly one
//! logical writer at a time; persistence guards concurrent submissions with
//! a revision check.
//!
//! Everything here serializes losslessly: phase, history, hypotheses,
//! iterations, loop-back audit, escalation state and the working conclusion
//! all survive a round-trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hypothesis::Hypothesis;
use crate::phase::{OodaStep, Phase};

// ============================================================================
// OODA Iteration
// ============================================================================

/// One pass of the tactical loop inside a phase.
///
/// `number` is monotonic within a phase lifetime and resets to 1 whenever
/// the phase changes. Progress is derived from the recorded facts, never
/// stored redundantly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OodaIteration {
    pub number: u32,
    pub phase: Phase,
    /// Steps completed this iteration, in insertion order.
    pub steps_completed: Vec<OodaStep>,
    /// New evidence items integrated this iteration.
    pub evidence_collected: u32,
    /// Ids of hypotheses tested this iteration.
    pub hypotheses_tested: Vec<String>,
    /// Whether any hypothesis confidence moved this iteration.
    pub confidence_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights: Option<String>,
    pub turn: u64,
}

impl OodaIteration {
    /// Progress means new evidence, a confidence movement, or a hypothesis
    /// actually tested.
    pub fn made_progress(&self) -> bool {
        self.evidence_collected > 0 || self.confidence_changed || !self.hypotheses_tested.is_empty()
    }
}

// ============================================================================
// Loop-Back Audit
// ============================================================================

/// Why a phase was exited backward (or why a backward request was refused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopBackReason {
    HypothesisRefuted,
    ScopeChanged,
    TimelineWrong,
    /// Ceiling hit: the jump was redirected forward instead.
    CeilingForcedForward,
}

/// Append-only record of one backward transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopBackRecord {
    pub from: Phase,
    pub to: Phase,
    pub reason: LoopBackReason,
    pub turn: u64,
}

// ============================================================================
// Escalation / Degraded Mode
// ============================================================================

/// Why the investigation cannot reach full confidence. Each type carries a
/// hard ceiling on conclusion confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedModeType {
    CriticalEvidenceMissing,
    ExpertiseRequired,
    SystemicIssue,
    HypothesisSpaceExhausted,
    GeneralLimitation,
}

impl DegradedModeType {
    /// Conclusion confidence is clamped to this while the mode is active.
    pub fn confidence_cap(&self) -> f64 {
        match self {
            DegradedModeType::CriticalEvidenceMissing => 0.50,
            DegradedModeType::ExpertiseRequired => 0.40,
            DegradedModeType::SystemicIssue => 0.30,
            DegradedModeType::HypothesisSpaceExhausted => 0.0,
            DegradedModeType::GeneralLimitation => 0.50,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DegradedModeType::CriticalEvidenceMissing => "critical evidence is unavailable",
            DegradedModeType::ExpertiseRequired => "outside expertise is required",
            DegradedModeType::SystemicIssue => "a systemic issue blocks resolution",
            DegradedModeType::HypothesisSpaceExhausted => "the hypothesis space is exhausted",
            DegradedModeType::GeneralLimitation => "a general limitation applies",
        }
    }
}

/// Degraded-mode status for the investigation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationState {
    pub operating_in_degraded_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_mode_type: Option<DegradedModeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entered_turn: Option<u64>,
    /// Flagged when a human hand-off was requested.
    pub human_handoff: bool,
}

impl EscalationState {
    pub fn confidence_cap(&self) -> Option<f64> {
        if !self.operating_in_degraded_mode {
            return None;
        }
        self.degraded_mode_type.map(|t| t.confidence_cap())
    }
}

// ============================================================================
// Working Conclusion
// ============================================================================

/// Derived confidence band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Speculation,
    Probable,
    Confident,
    Verified,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.90 {
            ConfidenceLevel::Verified
        } else if confidence >= 0.70 {
            ConfidenceLevel::Confident
        } else if confidence >= 0.50 {
            ConfidenceLevel::Probable
        } else {
            ConfidenceLevel::Speculation
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConfidenceLevel::Speculation => "speculation",
            ConfidenceLevel::Probable => "probable",
            ConfidenceLevel::Confident => "confident",
            ConfidenceLevel::Verified => "verified",
        };
        write!(f, "{s}")
    }
}

/// Best current root-cause statement plus confidence, recomputed every turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingConclusion {
    pub statement: String,
    /// In [0, 1], clamped to the degraded cap when one is active.
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub supporting_evidence_count: u32,
    pub caveats: Vec<String>,
    pub can_proceed_to_solution: bool,
    pub turn: u64,
}

// ============================================================================
// Audit Trail
// ============================================================================

/// Structured audit event kinds, the case's permanent timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    PhaseAdvanced,
    UrgencySkip,
    LoopBack,
    ForcedForward,
    AnchoringIntervention,
    DegradedModeEntered,
    EscalationFlagged,
    CollaboratorFailure,
    MalformedOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub turn: u64,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Urgency
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Urgency {
    fn default() -> Self {
        Urgency::Medium
    }
}

// ============================================================================
// Phase Goals
// ============================================================================

/// Markers set from structured collaborator output, read by the
/// intervention coordinator to decide phase completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseGoals {
    /// Formal problem definition captured during Intake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_frame: Option<String>,
    pub scope_assessed: bool,
    pub timeline_established: bool,
    pub solution_proposed: bool,
}

// ============================================================================
// Investigation State
// ============================================================================

/// One entry in the ordered, append-only phase history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseHistoryEntry {
    pub phase: Phase,
    pub entered_turn: u64,
}

/// The aggregate root for one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationState {
    /// Case id, stable across sessions.
    pub case_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency revision, bumped by the store on save.
    pub revision: u64,

    pub phase: Phase,
    pub phase_history: Vec<PhaseHistoryEntry>,
    /// Iteration counter within the current phase lifetime; resets on
    /// every phase change.
    pub phase_iteration: u32,
    pub turn: u64,

    pub loop_back_count: u8,
    pub loop_backs: Vec<LoopBackRecord>,

    pub escalation: EscalationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_conclusion: Option<WorkingConclusion>,
    pub caveats: Vec<String>,

    pub hypotheses: Vec<Hypothesis>,
    pub iterations: Vec<OodaIteration>,

    pub urgency: Urgency,
    pub urgency_confirmed: bool,
    pub goals: PhaseGoals,
    pub audit: Vec<AuditEvent>,
}

impl InvestigationState {
    /// Open a new case at Intake, turn 0.
    pub fn new(case_id: &str) -> Self {
        let now = Utc::now();
        Self {
            case_id: case_id.to_string(),
            created_at: now,
            updated_at: now,
            revision: 0,
            phase: Phase::Intake,
            phase_history: vec![PhaseHistoryEntry {
                phase: Phase::Intake,
                entered_turn: 0,
            }],
            phase_iteration: 0,
            turn: 0,
            loop_back_count: 0,
            loop_backs: Vec::new(),
            escalation: EscalationState::default(),
            working_conclusion: None,
            caveats: Vec::new(),
            hypotheses: Vec::new(),
            iterations: Vec::new(),
            urgency: Urgency::default(),
            urgency_confirmed: false,
            goals: PhaseGoals::default(),
            audit: Vec::new(),
        }
    }

    /// Move to a new phase: appends history, resets the phase iteration
    /// counter. Callers are responsible for having checked legality.
    pub fn enter_phase(&mut self, phase: Phase) {
        if phase == self.phase {
            return;
        }
        self.phase = phase;
        self.phase_iteration = 0;
        self.phase_history.push(PhaseHistoryEntry {
            phase,
            entered_turn: self.turn,
        });
    }

    pub fn record_audit(&mut self, kind: AuditKind, summary: &str) {
        self.audit.push(AuditEvent {
            kind,
            turn: self.turn,
            summary: summary.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn hypothesis_mut(&mut self, id: &str) -> Option<&mut Hypothesis> {
        self.hypotheses.iter_mut().find(|h| h.id == id)
    }

    pub fn hypothesis(&self, id: &str) -> Option<&Hypothesis> {
        self.hypotheses.iter().find(|h| h.id == id)
    }

    /// The hypothesis currently best placed to be the root cause: highest
    /// likelihood among those still in play.
    pub fn leading_hypothesis(&self) -> Option<&Hypothesis> {
        self.hypotheses
            .iter()
            .filter(|h| h.is_in_play())
            .max_by(|a, b| {
                a.likelihood
                    .partial_cmp(&b.likelihood)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Iterations belonging to the current phase lifetime, newest last.
    pub fn current_phase_iterations(&self) -> Vec<&OodaIteration> {
        let entered = self
            .phase_history
            .last()
            .map(|e| e.entered_turn)
            .unwrap_or(0);
        self.iterations
            .iter()
            .filter(|i| i.phase == self.phase && i.turn >= entered)
            .collect()
    }

    /// Last turn on which any iteration made progress.
    pub fn last_progress_turn(&self) -> Option<u64> {
        self.iterations
            .iter()
            .filter(|i| i.made_progress())
            .map(|i| i.turn)
            .max()
    }

    pub fn critical_urgency_confirmed(&self) -> bool {
        self.urgency == Urgency::Critical && self.urgency_confirmed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::hypothesis::{HypothesisCategory, HypothesisLedger, HypothesisStatus};

    #[test]
    fn test_fresh_case_starts_at_intake() {
        let state = InvestigationState::new("case-001");
        assert_eq!(state.phase, Phase::Intake);
        assert_eq!(state.turn, 0);
        assert_eq!(state.loop_back_count, 0);
        assert_eq!(state.phase_history.len(), 1);
        assert!(state.working_conclusion.is_none());
    }

    #[test]
    fn test_enter_phase_resets_iteration_counter() {
        let mut state = InvestigationState::new("case-002");
        state.phase_iteration = 4;
        state.turn = 9;
        state.enter_phase(Phase::BlastRadius);
        assert_eq!(state.phase_iteration, 0);
        assert_eq!(state.phase_history.len(), 2);
        assert_eq!(state.phase_history[1].entered_turn, 9);
    }

    #[test]
    fn test_enter_same_phase_is_a_no_op() {
        let mut state = InvestigationState::new("case-003");
        state.phase_iteration = 2;
        state.enter_phase(Phase::Intake);
        assert_eq!(state.phase_iteration, 2);
        assert_eq!(state.phase_history.len(), 1);
    }

    #[test]
    fn test_leading_hypothesis_skips_terminal() {
        let ledger = HypothesisLedger::new(EngineConfig::default());
        let mut state = InvestigationState::new("case-004");
        let mut strong = ledger.create("strong", HypothesisCategory::Code, 0.9, 1);
        strong.status = HypothesisStatus::Refuted;
        let mut weak = ledger.create("weak", HypothesisCategory::Network, 0.4, 1);
        weak.status = HypothesisStatus::Testing;
        state.hypotheses = vec![strong, weak];
        assert_eq!(state.leading_hypothesis().unwrap().statement, "weak");
    }

    #[test]
    fn test_iteration_progress_is_derived() {
        let idle = OodaIteration {
            number: 1,
            phase: Phase::Validation,
            steps_completed: vec![OodaStep::Observe],
            evidence_collected: 0,
            hypotheses_tested: Vec::new(),
            confidence_changed: false,
            insights: None,
            turn: 4,
        };
        assert!(!idle.made_progress());

        let tested = OodaIteration {
            hypotheses_tested: vec!["h1".to_string()],
            ..idle.clone()
        };
        assert!(tested.made_progress());

        let evidence = OodaIteration {
            evidence_collected: 2,
            ..idle
        };
        assert!(evidence.made_progress());
    }

    #[test]
    fn test_degraded_caps() {
        assert_eq!(DegradedModeType::CriticalEvidenceMissing.confidence_cap(), 0.50);
        assert_eq!(DegradedModeType::ExpertiseRequired.confidence_cap(), 0.40);
        assert_eq!(DegradedModeType::SystemicIssue.confidence_cap(), 0.30);
        assert_eq!(DegradedModeType::HypothesisSpaceExhausted.confidence_cap(), 0.0);
        assert_eq!(DegradedModeType::GeneralLimitation.confidence_cap(), 0.50);
    }

    #[test]
    fn test_confidence_levels() {
        assert_eq!(ConfidenceLevel::from_confidence(0.1), ConfidenceLevel::Speculation);
        assert_eq!(ConfidenceLevel::from_confidence(0.49), ConfidenceLevel::Speculation);
        assert_eq!(ConfidenceLevel::from_confidence(0.50), ConfidenceLevel::Probable);
        assert_eq!(ConfidenceLevel::from_confidence(0.69), ConfidenceLevel::Probable);
        assert_eq!(ConfidenceLevel::from_confidence(0.70), ConfidenceLevel::Confident);
        assert_eq!(ConfidenceLevel::from_confidence(0.89), ConfidenceLevel::Confident);
        assert_eq!(ConfidenceLevel::from_confidence(0.90), ConfidenceLevel::Verified);
    }

    #[test]
    fn test_state_round_trips_exactly() {
        let ledger = HypothesisLedger::new(EngineConfig::default());
        let mut state = InvestigationState::new("case-rt");
        state.turn = 7;
        state.enter_phase(Phase::BlastRadius);
        state.enter_phase(Phase::Timeline);
        state.loop_back_count = 2;
        state.loop_backs.push(LoopBackRecord {
            from: Phase::Validation,
            to: Phase::Hypothesis,
            reason: LoopBackReason::HypothesisRefuted,
            turn: 6,
        });
        state.escalation = EscalationState {
            operating_in_degraded_mode: true,
            degraded_mode_type: Some(DegradedModeType::ExpertiseRequired),
            entered_turn: Some(6),
            human_handoff: false,
        };
        let mut h = ledger.create("db connection pool exhausted", HypothesisCategory::ResourceExhaustion, 0.62, 3);
        h.supporting_evidence.push("ev-1".to_string());
        h.iterations_without_progress = 2;
        state.hypotheses.push(h);

        let json = serde_json::to_string(&state).unwrap();
        let back: InvestigationState = serde_json::from_str(&json).unwrap();

        assert_eq!(back.phase, state.phase);
        assert_eq!(back.loop_back_count, state.loop_back_count);
        assert_eq!(back.escalation, state.escalation);
        assert_eq!(back.hypotheses.len(), 1);
        assert_eq!(back.hypotheses[0].id, state.hypotheses[0].id);
        assert_eq!(back.hypotheses[0].likelihood, state.hypotheses[0].likelihood);
        assert_eq!(back.hypotheses[0].status, state.hypotheses[0].status);
        assert_eq!(
            back.hypotheses[0].iterations_without_progress,
            state.hypotheses[0].iterations_without_progress
        );
        assert_eq!(back.phase_history.len(), state.phase_history.len());
    }
}
