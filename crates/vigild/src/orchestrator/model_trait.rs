//! Model Client Trait Abstraction
//!
//! The engine never builds or inspects prompt text. It hands the caller
//! enough structured context to assemble a prompt (phase, hypotheses
//! summary, recent iterations, compressed history) and consumes back a raw
//! response: a free-text answer plus zero or more phase-specific structured
//! fields.
//!
//! Production wires a real client here; tests use `FakeModelClient` with
//! pre-queued replies, in the same shape as the probe and evidence fakes.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use vigil_common::{
    DegradedModeType, Hypothesis, HypothesisCategory, HypothesisStatus, OodaIteration, OodaStep,
    Phase, Urgency,
};

use crate::scheduler::IterationIntensity;

// ============================================================================
// Prompt Context
// ============================================================================

/// Condensed hypothesis view handed to the prompt builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypothesisSummary {
    pub id: String,
    pub statement: String,
    pub category: HypothesisCategory,
    pub likelihood: f64,
    pub status: HypothesisStatus,
}

impl From<&Hypothesis> for HypothesisSummary {
    fn from(h: &Hypothesis) -> Self {
        Self {
            id: h.id.clone(),
            statement: h.statement.clone(),
            category: h.category,
            likelihood: h.likelihood,
            status: h.status,
        }
    }
}

/// Structured context for one collaborator call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptContext {
    pub case_id: String,
    pub turn: u64,
    pub phase: Phase,
    pub intensity: IterationIntensity,
    /// Steps planned for this iteration, in execution order.
    pub steps: Vec<OodaStep>,
    pub urgency: Urgency,
    pub hypotheses: Vec<HypothesisSummary>,
    /// Ids the scheduler wants tested next, highest likelihood first.
    pub test_next: Vec<String>,
    pub recent_iterations: Vec<OodaIteration>,
    /// Compressed history from the context sink.
    pub context_summary: String,
}

// ============================================================================
// Raw Response and Signals
// ============================================================================

/// What comes back from the collaborator. `signals` is the already-parsed
/// structured portion; response-text parsing and its fallback tiers live
/// outside the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResponse {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signals: Option<serde_json::Value>,
}

impl RawResponse {
    pub fn text(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            signals: None,
        }
    }

    pub fn with_signals(answer: &str, signals: serde_json::Value) -> Self {
        Self {
            answer: answer.to_string(),
            signals: Some(signals),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrgencySignal {
    pub level: Urgency,
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeAssessment {
    pub summary: String,
    #[serde(default)]
    pub scope_changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineUpdate {
    pub summary: String,
    #[serde(default)]
    pub established: bool,
    #[serde(default)]
    pub assumptions_wrong: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypothesisProposal {
    pub statement: String,
    pub category: HypothesisCategory,
    pub likelihood: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceUpdate {
    pub hypothesis_id: String,
    pub likelihood: f64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationSignal {
    pub kind: DegradedModeType,
    pub reason: String,
}

/// The structured fields the engine understands. Everything is optional;
/// absent fields simply contribute nothing to the turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseSignals {
    pub anomaly_frame: Option<String>,
    pub urgency: Option<UrgencySignal>,
    pub scope_assessment: Option<ScopeAssessment>,
    pub timeline_update: Option<TimelineUpdate>,
    pub proposed_hypotheses: Vec<HypothesisProposal>,
    pub confidence_updates: Vec<ConfidenceUpdate>,
    pub tested_hypotheses: Vec<String>,
    pub evidence_requests: Vec<String>,
    pub solution_proposal: Option<String>,
    pub escalation: Option<EscalationSignal>,
    pub needs_human: bool,
    pub insights: Option<String>,
}

// ============================================================================
// Trait
// ============================================================================

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// One text-generation call. Timeouts and transport failures surface as
    /// errors; the engine tolerates them without corrupting state.
    async fn generate(&self, context: &PromptContext) -> Result<RawResponse>;
}

// ============================================================================
// Fake Model Client (Testing)
// ============================================================================

#[derive(Debug, Clone)]
enum FakeReply {
    Reply(RawResponse),
    Failure(String),
}

/// Pre-queued replies, FIFO. When the queue runs dry the fake returns a
/// benign free-text acknowledgement. Every received context is recorded
/// for assertions.
pub struct FakeModelClient {
    replies: Mutex<VecDeque<FakeReply>>,
    calls: Mutex<Vec<PromptContext>>,
}

impl FakeModelClient {
    pub fn builder() -> FakeModelClientBuilder {
        FakeModelClientBuilder::default()
    }

    /// Contexts received so far, in call order.
    pub fn calls(&self) -> Vec<PromptContext> {
        self.calls.lock().expect("fake client lock poisoned").clone()
    }
}

#[async_trait]
impl ModelClient for FakeModelClient {
    async fn generate(&self, context: &PromptContext) -> Result<RawResponse> {
        self.calls
            .lock()
            .expect("fake client lock poisoned")
            .push(context.clone());
        let next = self
            .replies
            .lock()
            .expect("fake client lock poisoned")
            .pop_front();
        match next {
            Some(FakeReply::Reply(r)) => Ok(r),
            Some(FakeReply::Failure(msg)) => Err(anyhow!(msg)),
            None => Ok(RawResponse::text("acknowledged")),
        }
    }
}

#[derive(Default)]
pub struct FakeModelClientBuilder {
    replies: VecDeque<FakeReply>,
}

impl FakeModelClientBuilder {
    pub fn reply(mut self, response: RawResponse) -> Self {
        self.replies.push_back(FakeReply::Reply(response));
        self
    }

    pub fn reply_text(self, answer: &str) -> Self {
        self.reply(RawResponse::text(answer))
    }

    pub fn reply_signals(self, answer: &str, signals: serde_json::Value) -> Self {
        self.reply(RawResponse::with_signals(answer, signals))
    }

    pub fn failure(mut self, message: &str) -> Self {
        self.replies.push_back(FakeReply::Failure(message.to_string()));
        self
    }

    pub fn build(self) -> FakeModelClient {
        FakeModelClient {
            replies: Mutex::new(self.replies),
            calls: Mutex::new(Vec::new()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> PromptContext {
        PromptContext {
            case_id: "case-fake".to_string(),
            turn: 1,
            phase: Phase::Intake,
            intensity: IterationIntensity::None,
            steps: Vec::new(),
            urgency: Urgency::Medium,
            hypotheses: Vec::new(),
            test_next: Vec::new(),
            recent_iterations: Vec::new(),
            context_summary: String::new(),
        }
    }

    #[tokio::test]
    async fn test_fake_replays_in_order() {
        let client = FakeModelClient::builder()
            .reply_text("first")
            .failure("timeout")
            .build();

        let first = client.generate(&context()).await.unwrap();
        assert_eq!(first.answer, "first");
        assert!(client.generate(&context()).await.is_err());
        // Queue empty: benign default.
        let third = client.generate(&context()).await.unwrap();
        assert_eq!(third.answer, "acknowledged");
        assert_eq!(client.calls().len(), 3);
    }

    #[test]
    fn test_signals_tolerate_partial_json() {
        let signals: PhaseSignals = serde_json::from_value(serde_json::json!({
            "anomaly_frame": "api errors spiking",
        }))
        .unwrap();
        assert_eq!(signals.anomaly_frame.as_deref(), Some("api errors spiking"));
        assert!(signals.proposed_hypotheses.is_empty());
        assert!(!signals.needs_human);
    }

    #[test]
    fn test_signals_reject_wrong_shapes() {
        let result = serde_json::from_value::<PhaseSignals>(serde_json::json!({
            "proposed_hypotheses": "not a list",
        }));
        assert!(result.is_err());
    }
}
