//! Orchestrator - one investigation turn, end to end
//!
//! ## Flow
//!
//! ```text
//! load state -> schedule iteration -> collaborator call -> integrate signals
//!     -> integrate evidence delta -> decay stalled hypotheses
//!     -> urgency skip / intervention / loop-back routing
//!     -> degraded-mode check -> working conclusion -> persist
//! ```
//!
//! ## Invariants
//!
//! 1. One logical writer per case; a turn runs to completion
//! 2. A failed collaborator call leaves state untouched except the turn
//!    counter (which is monotonic and idempotent to retry)
//! 3. Malformed structured output degrades to the free-text answer; the
//!    turn never fails for it
//! 4. At most one intervention per turn, phase completion first
//! 5. Phase handling is an exhaustive match, no handler maps

use chrono::Utc;
use tracing::{debug, info, warn};

use vigil_common::{
    AuditKind, EngineConfig, EvidencePolarity, HypothesisCategory, HypothesisLedger,
    HypothesisStatus, InvestigationState, OodaIteration, Phase, PhaseCatalog, VigilError,
    WorkingConclusion,
};

use super::context_trait::ContextSink;
use super::evidence_trait::EvidenceStore;
use super::model_trait::{
    HypothesisSummary, ModelClient, PhaseSignals, PromptContext, RawResponse,
};
use crate::estimator::ConclusionEstimator;
use crate::intervention::{InterventionCoordinator, InterventionKind, InterventionPlan};
use crate::router::{LoopBackRouter, PhaseOutcome, RouteDecision};
use crate::scheduler::{IterationIntensity, StepScheduler};
use crate::store::StateStore;

// ============================================================================
// Constants
// ============================================================================

/// Returned when the collaborator call fails; the phase does not advance.
const FALLBACK_ANSWER: &str =
    "The investigation assistant is temporarily unavailable. State is preserved; retry the turn.";

/// Recent iterations included in prompt context.
const RECENT_ITERATIONS: usize = 3;

// ============================================================================
// Turn Report
// ============================================================================

/// Everything the caller learns about one processed turn. Advisory errors
/// (collaborator failure, refused transitions, malformed output) surface
/// here as messages, never as `Err`.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub case_id: String,
    pub turn: u64,
    pub phase_before: Phase,
    pub phase_after: Phase,
    pub intensity: IterationIntensity,
    pub iteration: Option<OodaIteration>,
    pub made_progress: bool,
    pub stall_reason: Option<String>,
    pub intervention: Option<InterventionPlan>,
    pub route: Option<RouteDecision>,
    /// Categories to diversify into after an anchoring intervention.
    pub diversify_into: Vec<HypothesisCategory>,
    /// Completeness of this turn's evidence requests, when any were made.
    pub request_completeness: Option<f64>,
    pub conclusion: Option<WorkingConclusion>,
    pub advisories: Vec<String>,
    pub answer: String,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Composes catalog, ledger, scheduler, coordinator, router and estimator
/// over one investigation turn. Collaborators are trait objects so tests
/// run with fakes.
pub struct Orchestrator {
    config: EngineConfig,
    catalog: PhaseCatalog,
    scheduler: StepScheduler,
    ledger: HypothesisLedger,
    coordinator: InterventionCoordinator,
    router: LoopBackRouter,
    estimator: ConclusionEstimator,
    model: Box<dyn ModelClient>,
    evidence: Box<dyn EvidenceStore>,
    context: Box<dyn ContextSink>,
}

impl Orchestrator {
    pub fn new(
        config: EngineConfig,
        model: Box<dyn ModelClient>,
        evidence: Box<dyn EvidenceStore>,
        context: Box<dyn ContextSink>,
    ) -> Self {
        let catalog = PhaseCatalog::standard();
        Self {
            catalog: catalog.clone(),
            scheduler: StepScheduler::new(catalog.clone()),
            ledger: HypothesisLedger::new(config.clone()),
            coordinator: InterventionCoordinator::new(config.clone()),
            router: LoopBackRouter::new(catalog, &config),
            estimator: ConclusionEstimator::new(config.clone()),
            config,
            model,
            evidence,
            context,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open a fresh case at Intake, turn 0, and persist it.
    pub async fn open_case(
        &self,
        store: &dyn StateStore,
        case_id: &str,
    ) -> Result<InvestigationState, VigilError> {
        if store.load(case_id).await?.is_some() {
            return Err(VigilError::CaseExists(case_id.to_string()));
        }
        let mut state = InvestigationState::new(case_id);
        state.revision = store.save(&state).await?;
        info!(case = %case_id, "case opened");
        Ok(state)
    }

    /// Load, process one turn, and persist with the revision check.
    pub async fn run_case_turn(
        &self,
        store: &dyn StateStore,
        case_id: &str,
    ) -> Result<TurnReport, VigilError> {
        let mut state = store
            .load(case_id)
            .await?
            .ok_or_else(|| VigilError::CaseNotFound(case_id.to_string()))?;
        let report = self.process_turn(&mut state).await?;
        state.revision = store.save(&state).await?;
        Ok(report)
    }

    /// Process one conversational turn against an already-loaded aggregate.
    pub async fn process_turn(
        &self,
        state: &mut InvestigationState,
    ) -> Result<TurnReport, VigilError> {
        let phase_before = state.phase;
        state.turn += 1;
        let turn = state.turn;
        info!(case = %state.case_id, turn, phase = %phase_before, "processing turn");

        let intensity = StepScheduler::intensity(state.phase, state.phase_iteration + 1);
        let steps = self.scheduler.steps_for(state.phase, intensity);
        let mut advisories = Vec::new();

        // The collaborator call is the only suspension point that may fail;
        // everything before it is read-only against the aggregate.
        let prompt = self.build_prompt_context(state, intensity, &steps).await;
        let response = match self.model.generate(&prompt).await {
            Ok(r) => r,
            Err(e) => {
                let err = VigilError::CollaboratorFailure(e.to_string());
                warn!(case = %state.case_id, turn, error = %e, "collaborator call failed");
                return Ok(TurnReport {
                    case_id: state.case_id.clone(),
                    turn,
                    phase_before,
                    phase_after: state.phase,
                    intensity,
                    iteration: None,
                    made_progress: false,
                    stall_reason: None,
                    intervention: None,
                    route: None,
                    diversify_into: Vec::new(),
                    request_completeness: None,
                    conclusion: state.working_conclusion.clone(),
                    advisories: vec![err.to_string()],
                    answer: FALLBACK_ANSWER.to_string(),
                });
            }
        };

        let signals = self.parse_signals(state, &response, &mut advisories);

        // Evidence delta since the previous turn, attributed by the store.
        let delta = match self.evidence.evidence_since(turn - 1).await {
            Ok(items) => items,
            Err(e) => {
                warn!(case = %state.case_id, error = %e, "evidence delta unavailable");
                Vec::new()
            }
        };

        let mut progressed: Vec<String> = Vec::new();
        let mut evidence_ids: Vec<String> = Vec::new();
        for item in &delta {
            evidence_ids.push(item.id.clone());
            if let Some(id) = attach_evidence(state, item) {
                progressed.push(id);
            }
        }

        // Phase-specific evidence requests (Validation mostly).
        let request_completeness = if signals.evidence_requests.is_empty() {
            None
        } else {
            match self.evidence.evidence_for(&signals.evidence_requests).await {
                Ok(items) => {
                    for item in &items {
                        // Requested items count as new evidence too, once.
                        if !evidence_ids.contains(&item.id) {
                            evidence_ids.push(item.id.clone());
                        }
                        if let Some(id) = attach_evidence(state, item) {
                            progressed.push(id);
                        }
                    }
                }
                Err(e) => warn!(case = %state.case_id, error = %e, "evidence_for failed"),
            }
            self.evidence
                .completeness_ratio(&signals.evidence_requests)
                .await
                .ok()
        };

        let refuted_before: usize = count_refuted(state);
        let mut confidence_changed = false;
        self.integrate_signals(state, &signals, &mut progressed, &mut confidence_changed, &mut advisories);
        let refuted_this_turn = count_refuted(state) > refuted_before;

        // Iteration bookkeeping.
        let evidence_count = evidence_ids.len() as u32;
        let (iteration, made_progress, stall_reason) = if intensity == IterationIntensity::None {
            (None, false, None)
        } else {
            let mut iteration = self.scheduler.start_iteration(state);
            iteration.steps_completed = steps.clone();
            iteration.evidence_collected = evidence_count;
            iteration.hypotheses_tested = signals
                .tested_hypotheses
                .iter()
                .filter(|id| state.hypothesis(id).is_some())
                .cloned()
                .collect();
            iteration.confidence_changed = confidence_changed;
            iteration.insights = signals.insights.clone();

            let result = self.scheduler.complete_iteration(state, &iteration);
            self.decay_stalled(state, &progressed, turn);

            state.iterations.push(iteration.clone());
            if let Err(e) = self.context.absorb_iteration(&iteration).await {
                warn!(case = %state.case_id, error = %e, "context sink rejected iteration");
            }
            (Some(iteration), result.made_progress, result.stall_reason)
        };

        // Control arbitration: urgency skip, then at most one intervention,
        // then loop-back routing.
        let mut route = None;
        let mut intervention = None;
        let mut diversify_into = Vec::new();

        let skipped_forward = self.maybe_urgency_skip(state);
        if !skipped_forward {
            intervention = self.coordinator.decide(state);
            match intervention.as_ref().map(|p| p.kind) {
                Some(InterventionKind::PhaseCompletion) => {
                    let decision = self.router.route(PhaseOutcome::Completed, state);
                    if decision.next_phase != state.phase {
                        state.record_audit(
                            AuditKind::PhaseAdvanced,
                            &format!("{} -> {}", state.phase, decision.next_phase),
                        );
                        state.enter_phase(decision.next_phase);
                    }
                    route = Some(decision);
                }
                Some(InterventionKind::AnchoringPrevention) => {
                    diversify_into = self
                        .ledger
                        .force_alternative_generation(&state.hypotheses, turn);
                    let reason = intervention
                        .as_ref()
                        .map(|p| p.reason.clone())
                        .unwrap_or_default();
                    state.record_audit(AuditKind::AnchoringIntervention, &reason);
                }
                None => {}
            }

            if route.is_none() {
                if let Some(outcome) = self.derive_outcome(state, &signals, refuted_this_turn) {
                    let decision = self.router.route(outcome, state);
                    if decision.next_phase != state.phase {
                        state.enter_phase(decision.next_phase);
                    }
                    route = Some(decision);
                }
            }
        }

        self.maybe_enter_degraded_mode(state, &signals);

        let conclusion = self.estimator.generate_working_conclusion(state, turn);
        state.working_conclusion = Some(conclusion.clone());
        state.updated_at = Utc::now();

        debug!(
            case = %state.case_id,
            turn,
            phase = %state.phase,
            confidence = conclusion.confidence,
            "turn complete"
        );

        Ok(TurnReport {
            case_id: state.case_id.clone(),
            turn,
            phase_before,
            phase_after: state.phase,
            intensity,
            iteration,
            made_progress,
            stall_reason,
            intervention,
            route,
            diversify_into,
            request_completeness,
            conclusion: Some(conclusion),
            advisories,
            answer: response.answer,
        })
    }

    // ------------------------------------------------------------------
    // Turn internals
    // ------------------------------------------------------------------

    async fn build_prompt_context(
        &self,
        state: &InvestigationState,
        intensity: IterationIntensity,
        steps: &[vigil_common::OodaStep],
    ) -> PromptContext {
        let context_summary = match self
            .context
            .context_summary(self.config.context_summary_tokens)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                warn!(case = %state.case_id, error = %e, "context summary unavailable");
                String::new()
            }
        };
        let test_next = self
            .ledger
            .testable_hypotheses(&state.hypotheses, self.config.max_testable_hypotheses)
            .iter()
            .map(|h| h.id.clone())
            .collect();
        let recent_start = state.iterations.len().saturating_sub(RECENT_ITERATIONS);
        PromptContext {
            case_id: state.case_id.clone(),
            turn: state.turn,
            phase: state.phase,
            intensity,
            steps: steps.to_vec(),
            urgency: state.urgency,
            hypotheses: state
                .hypotheses
                .iter()
                .filter(|h| h.is_in_play())
                .map(HypothesisSummary::from)
                .collect(),
            test_next,
            recent_iterations: state.iterations[recent_start..].to_vec(),
            context_summary,
        }
    }

    fn parse_signals(
        &self,
        state: &mut InvestigationState,
        response: &RawResponse,
        advisories: &mut Vec<String>,
    ) -> PhaseSignals {
        match &response.signals {
            None => PhaseSignals::default(),
            Some(value) => match serde_json::from_value::<PhaseSignals>(value.clone()) {
                Ok(signals) => signals,
                Err(e) => {
                    let err = VigilError::MalformedOutput(e.to_string());
                    warn!(case = %state.case_id, error = %e, "structured fields unusable");
                    state.record_audit(AuditKind::MalformedOutput, &err.to_string());
                    advisories.push(err.to_string());
                    PhaseSignals::default()
                }
            },
        }
    }

    /// Fold structured signals into the aggregate. Cross-phase fields apply
    /// everywhere; goal markers are an exhaustive match over the phase.
    fn integrate_signals(
        &self,
        state: &mut InvestigationState,
        signals: &PhaseSignals,
        progressed: &mut Vec<String>,
        confidence_changed: &mut bool,
        advisories: &mut Vec<String>,
    ) {
        let turn = state.turn;

        if let Some(urgency) = &signals.urgency {
            state.urgency = urgency.level;
            state.urgency_confirmed = urgency.confirmed;
        }

        for proposal in &signals.proposed_hypotheses {
            let mut h = self.ledger.create(
                &proposal.statement,
                proposal.category,
                proposal.likelihood,
                turn,
            );
            h.status = HypothesisStatus::Captured;
            debug!(case = %state.case_id, hypothesis = %h.id, category = %h.category, "hypothesis captured");
            progressed.push(h.id.clone());
            state.hypotheses.push(h);
        }

        for id in &signals.tested_hypotheses {
            match state.hypothesis_mut(id) {
                Some(h) => {
                    if matches!(h.status, HypothesisStatus::Proposed | HypothesisStatus::Captured) {
                        h.status = HypothesisStatus::Testing;
                    }
                    progressed.push(id.clone());
                }
                None => advisories.push(format!("tested unknown hypothesis {id}")),
            }
        }

        for update in &signals.confidence_updates {
            match state.hypothesis_mut(&update.hypothesis_id) {
                Some(h) => {
                    self.ledger
                        .update_confidence(h, update.likelihood, turn, &update.reason);
                    *confidence_changed = true;
                    progressed.push(update.hypothesis_id.clone());
                }
                None => advisories.push(format!(
                    "confidence update for unknown hypothesis {}",
                    update.hypothesis_id
                )),
            }
        }

        match state.phase {
            Phase::Intake => {
                if let Some(frame) = &signals.anomaly_frame {
                    state.goals.anomaly_frame = Some(frame.clone());
                }
            }
            Phase::BlastRadius => {
                if signals.scope_assessment.is_some() {
                    state.goals.scope_assessed = true;
                }
            }
            Phase::Timeline => {
                if let Some(update) = &signals.timeline_update {
                    if update.established {
                        state.goals.timeline_established = true;
                    }
                }
            }
            // Hypothesis and Validation goals are read off the ledger, not
            // off signal markers.
            Phase::Hypothesis | Phase::Validation => {}
            Phase::Solution => {
                if signals.solution_proposal.is_some() {
                    state.goals.solution_proposed = true;
                }
            }
            Phase::Document => {}
        }
    }

    /// Apply one decay step to every testing hypothesis that saw no
    /// progress this turn.
    fn decay_stalled(&self, state: &mut InvestigationState, progressed: &[String], turn: u64) {
        for h in &mut state.hypotheses {
            if h.status.decays() && !progressed.contains(&h.id) {
                self.ledger.apply_confidence_decay(h, turn);
            }
        }
    }

    /// Confirmed critical urgency in an early phase jumps straight to
    /// Solution. Forward skip, never counted against the loop-back ceiling.
    fn maybe_urgency_skip(&self, state: &mut InvestigationState) -> bool {
        if !state.critical_urgency_confirmed() {
            return false;
        }
        if !matches!(state.phase, Phase::Intake | Phase::BlastRadius) {
            return false;
        }
        if self
            .catalog
            .can_transition(state.phase, Phase::Solution, true)
            .is_err()
        {
            return false;
        }
        info!(case = %state.case_id, from = %state.phase, "critical urgency, skipping to solution");
        state.record_audit(
            AuditKind::UrgencySkip,
            &format!("{} -> {} on confirmed critical urgency", state.phase, Phase::Solution),
        );
        state.enter_phase(Phase::Solution);
        true
    }

    /// Loop-back outcome for this turn, if any. Human hand-off outranks
    /// assumption invalidation; a collapsed hypothesis set only routes once
    /// validation is actually underway.
    fn derive_outcome(
        &self,
        state: &InvestigationState,
        signals: &PhaseSignals,
        refuted_this_turn: bool,
    ) -> Option<PhaseOutcome> {
        if signals.needs_human {
            return Some(PhaseOutcome::EscalationNeeded);
        }
        if let Some(scope) = &signals.scope_assessment {
            if scope.scope_changed && state.phase.ordinal() > Phase::BlastRadius.ordinal() {
                return Some(PhaseOutcome::ScopeChanged);
            }
        }
        if let Some(update) = &signals.timeline_update {
            if update.assumptions_wrong && state.phase.ordinal() > Phase::Timeline.ordinal() {
                return Some(PhaseOutcome::TimelineWrong);
            }
        }
        let any_testing = state
            .hypotheses
            .iter()
            .any(|h| h.status == HypothesisStatus::Testing);
        if refuted_this_turn && !any_testing && state.phase.ordinal() > Phase::Hypothesis.ordinal()
        {
            return Some(PhaseOutcome::HypothesisRefuted);
        }
        None
    }

    fn maybe_enter_degraded_mode(&self, state: &mut InvestigationState, signals: &PhaseSignals) {
        if state.escalation.operating_in_degraded_mode {
            return;
        }
        let entry = match &signals.escalation {
            Some(signal) => Some((signal.kind, signal.reason.clone())),
            None => self.estimator.should_enter_degraded_mode(state),
        };
        if let Some((mode, reason)) = entry {
            warn!(case = %state.case_id, ?mode, reason = %reason, "entering degraded mode");
            state.escalation.operating_in_degraded_mode = true;
            state.escalation.degraded_mode_type = Some(mode);
            state.escalation.entered_turn = Some(state.turn);
            state.record_audit(
                AuditKind::DegradedModeEntered,
                &format!("{}: {}", mode.description(), reason),
            );
        }
    }
}

/// Attach one evidence item to its hypothesis. Returns the hypothesis id
/// when the item landed on it.
fn attach_evidence(state: &mut InvestigationState, item: &vigil_common::EvidenceItem) -> Option<String> {
    let id = item.hypothesis_id.as_ref()?;
    let h = state.hypothesis_mut(id)?;
    let list = match item.polarity {
        EvidencePolarity::Supportive => &mut h.supporting_evidence,
        EvidencePolarity::Refuting => &mut h.refuting_evidence,
        EvidencePolarity::Neutral => return None,
    };
    if !list.contains(&item.id) {
        list.push(item.id.clone());
    }
    Some(id.clone())
}

fn count_refuted(state: &InvestigationState) -> usize {
    state
        .hypotheses
        .iter()
        .filter(|h| h.status == HypothesisStatus::Refuted)
        .count()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::context_trait::NoopContextSink;
    use crate::orchestrator::evidence_trait::FakeEvidenceStore;
    use crate::orchestrator::model_trait::FakeModelClient;
    use serde_json::json;

    fn engine_with(model: FakeModelClient) -> Orchestrator {
        Orchestrator::new(
            EngineConfig::default(),
            Box::new(model),
            Box::new(FakeEvidenceStore::new()),
            Box::new(NoopContextSink),
        )
    }

    #[tokio::test]
    async fn test_collaborator_failure_preserves_state() {
        let model = FakeModelClient::builder().failure("timeout").build();
        let engine = engine_with(model);
        let mut state = InvestigationState::new("case-fail");
        let snapshot = serde_json::to_value(&state).unwrap();

        let report = engine.process_turn(&mut state).await.unwrap();

        assert_eq!(state.turn, 1, "turn counter is the one allowed side effect");
        assert_eq!(report.answer, FALLBACK_ANSWER);
        assert_eq!(report.phase_after, Phase::Intake);
        assert!(report.advisories[0].contains("collaborator failure"));

        // Everything besides the counter is untouched.
        state.turn = 0;
        assert_eq!(serde_json::to_value(&state).unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_malformed_signals_degrade_to_answer() {
        let model = FakeModelClient::builder()
            .reply_signals("partial read", json!({"proposed_hypotheses": 42}))
            .build();
        let engine = engine_with(model);
        let mut state = InvestigationState::new("case-malformed");

        let report = engine.process_turn(&mut state).await.unwrap();

        assert_eq!(report.answer, "partial read");
        assert!(report
            .advisories
            .iter()
            .any(|a| a.contains("malformed collaborator output")));
        assert_eq!(state.audit.last().unwrap().kind, AuditKind::MalformedOutput);
        assert_eq!(state.phase, Phase::Intake, "turn never fails for this");
    }

    #[tokio::test]
    async fn test_intake_completion_advances() {
        let model = FakeModelClient::builder()
            .reply_signals(
                "framed the anomaly",
                json!({"anomaly_frame": "checkout p99 regressed after 14:00 deploy"}),
            )
            .build();
        let engine = engine_with(model);
        let mut state = InvestigationState::new("case-intake");

        let report = engine.process_turn(&mut state).await.unwrap();

        assert_eq!(report.phase_before, Phase::Intake);
        assert_eq!(report.phase_after, Phase::BlastRadius);
        assert_eq!(
            report.intervention.as_ref().unwrap().kind,
            InterventionKind::PhaseCompletion
        );
        // Intake runs no tactical loop.
        assert!(report.iteration.is_none());
        assert_eq!(report.intensity, IterationIntensity::None);
    }

    #[tokio::test]
    async fn test_run_case_turn_persists_with_cas() {
        use crate::store::MemoryStateStore;

        let model = FakeModelClient::builder().reply_text("looking").build();
        let engine = engine_with(model);
        let store = MemoryStateStore::new();
        engine.open_case(&store, "case-store").await.unwrap();

        let report = engine.run_case_turn(&store, "case-store").await.unwrap();
        assert_eq!(report.turn, 1);

        let stored = store.load("case-store").await.unwrap().unwrap();
        assert_eq!(stored.turn, 1);
        assert_eq!(stored.revision, 2);

        let missing = engine.run_case_turn(&store, "case-missing").await;
        assert!(matches!(missing, Err(VigilError::CaseNotFound(_))));
    }

    #[tokio::test]
    async fn test_open_case_twice_is_refused() {
        use crate::store::MemoryStateStore;

        let engine = engine_with(FakeModelClient::builder().build());
        let store = MemoryStateStore::new();
        engine.open_case(&store, "case-dup").await.unwrap();
        assert!(engine.open_case(&store, "case-dup").await.is_err());
    }
}
