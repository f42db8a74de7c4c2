//! Turn Orchestration
//!
//! One conversational turn runs to completion: read state, schedule the
//! iteration, call the text-generation collaborator, integrate its output
//! and the evidence delta, arbitrate interventions, route the phase,
//! re-estimate the working conclusion, persist.
//!
//! Invariants:
//! - The collaborator call is the only suspension point in a turn
//! - A collaborator failure leaves state untouched except the turn counter
//! - Exactly one intervention per turn, phase completion before anchoring
//! - The engine never inspects prompt text; it supplies structured context
//!   and consumes structured signals back

pub mod context_trait;
pub mod engine;
pub mod evidence_trait;
pub mod model_trait;

pub use context_trait::{ContextSink, MemoryContextSink, NoopContextSink};
pub use engine::{Orchestrator, TurnReport};
pub use evidence_trait::{EvidenceStore, FakeEvidenceStore};
pub use model_trait::{
    ConfidenceUpdate, FakeModelClient, FakeModelClientBuilder, HypothesisProposal,
    HypothesisSummary, ModelClient, PhaseSignals, PromptContext, RawResponse, ScopeAssessment,
    TimelineUpdate, UrgencySignal,
};
