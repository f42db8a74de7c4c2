//! Vigild - Investigation Orchestration Engine
//!
//! Drives a multi-step, model-assisted incident investigation: decides which
//! tactical step runs each turn, tracks competing root-cause hypotheses, and
//! knows when to stop, loop back, or degrade its confidence claims.
//!
//! Component stack, leaves first:
//!
//! 1. PhaseCatalog (vigil_common) - phase definitions and legal transitions
//! 2. HypothesisLedger (vigil_common) - hypothesis lifecycle, decay, anchoring
//! 3. StepScheduler - which OODA steps run, at what intensity
//! 4. InterventionCoordinator - priority arbitration between control signals
//! 5. LoopBackRouter - bounded backward jumps, livelock prevention
//! 6. ConclusionEstimator - working conclusion, momentum, degraded mode
//! 7. Orchestrator - composes the above per turn
//!
//! Invariants:
//! - One logical writer per case; a turn runs to completion before the next
//! - The only suspension point in a turn is the collaborator call
//! - A failed collaborator call leaves state untouched except the turn counter
//! - Loop-backs are globally capped; the cap forces forward progression

pub mod estimator;
pub mod intervention;
pub mod orchestrator;
pub mod router;
pub mod scheduler;
pub mod store;

pub use estimator::{ConclusionEstimator, Momentum, ProgressMetrics};
pub use intervention::{InterventionCoordinator, InterventionKind, InterventionPlan};
pub use orchestrator::{
    ContextSink, EvidenceStore, FakeEvidenceStore, FakeModelClient, FakeModelClientBuilder,
    MemoryContextSink, ModelClient, NoopContextSink, Orchestrator, PromptContext, RawResponse,
    TurnReport,
};
pub use router::{LoopBackRouter, PhaseOutcome, RouteDecision};
pub use scheduler::{IterationIntensity, IterationResult, StepScheduler};
pub use store::{JsonDirStore, MemoryStateStore, StateStore};
