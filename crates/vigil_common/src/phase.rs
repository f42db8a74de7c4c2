//! Phase Catalog - the 7-phase investigation lifecycle
//!
//! 1. Intake - Receive the incident, capture the anomaly frame and urgency
//! 2. BlastRadius - Assess scope and impact
//! 3. Timeline - Establish when things changed
//! 4. Hypothesis - Generate candidate root causes
//! 5. Validation - Test hypotheses against evidence
//! 6. Solution - Propose and verify remediation
//! 7. Document - Record the case, terminal
//!
//! Each phase carries a weight profile over the four OODA steps. Normalized
//! weight >= 0.30 makes a step required every iteration, anything above zero
//! but below 0.30 makes it optional, and exactly zero forbids it.
//!
//! Transition rules: the designated successor is always legal; Intake and
//! BlastRadius may skip straight to Solution on confirmed critical urgency;
//! everything else needs loop-back authorization from the router.

use serde::{Deserialize, Serialize};

use crate::error::VigilError;

// ============================================================================
// Phase Enum
// ============================================================================

/// The 7 phases of an investigation, in ordinal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Phase 0: Receive the incident and frame the anomaly
    Intake,
    /// Phase 1: Assess scope and impact
    BlastRadius,
    /// Phase 2: Establish the change timeline
    Timeline,
    /// Phase 3: Generate candidate root causes
    Hypothesis,
    /// Phase 4: Test hypotheses against evidence
    Validation,
    /// Phase 5: Propose and verify remediation
    Solution,
    /// Phase 6: Record the case (terminal)
    Document,
}

impl Phase {
    pub fn all() -> [Phase; 7] {
        [
            Phase::Intake,
            Phase::BlastRadius,
            Phase::Timeline,
            Phase::Hypothesis,
            Phase::Validation,
            Phase::Solution,
            Phase::Document,
        ]
    }

    /// Ordinal position, used for default forward advancement and for
    /// telling backward jumps from forward skips.
    pub fn ordinal(&self) -> usize {
        match self {
            Phase::Intake => 0,
            Phase::BlastRadius => 1,
            Phase::Timeline => 2,
            Phase::Hypothesis => 3,
            Phase::Validation => 4,
            Phase::Solution => 5,
            Phase::Document => 6,
        }
    }

    /// The designated successor in the normal forward flow.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Intake => Some(Phase::BlastRadius),
            Phase::BlastRadius => Some(Phase::Timeline),
            Phase::Timeline => Some(Phase::Hypothesis),
            Phase::Hypothesis => Some(Phase::Validation),
            Phase::Validation => Some(Phase::Solution),
            Phase::Solution => Some(Phase::Document),
            Phase::Document => None, // Terminal phase
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Document)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Phase::Intake => "Receiving incident",
            Phase::BlastRadius => "Assessing blast radius",
            Phase::Timeline => "Establishing timeline",
            Phase::Hypothesis => "Generating hypotheses",
            Phase::Validation => "Validating hypotheses",
            Phase::Solution => "Working the solution",
            Phase::Document => "Documenting the case",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Intake => write!(f, "intake"),
            Phase::BlastRadius => write!(f, "blast_radius"),
            Phase::Timeline => write!(f, "timeline"),
            Phase::Hypothesis => write!(f, "hypothesis"),
            Phase::Validation => write!(f, "validation"),
            Phase::Solution => write!(f, "solution"),
            Phase::Document => write!(f, "document"),
        }
    }
}

// ============================================================================
// OODA Steps
// ============================================================================

/// The four tactical steps executed within each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OodaStep {
    Observe,
    Orient,
    Decide,
    Act,
}

impl OodaStep {
    pub fn all() -> [OodaStep; 4] {
        [
            OodaStep::Observe,
            OodaStep::Orient,
            OodaStep::Decide,
            OodaStep::Act,
        ]
    }
}

impl std::fmt::Display for OodaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OodaStep::Observe => write!(f, "observe"),
            OodaStep::Orient => write!(f, "orient"),
            OodaStep::Decide => write!(f, "decide"),
            OodaStep::Act => write!(f, "act"),
        }
    }
}

/// How strongly a phase calls for a step each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRequirement {
    /// Normalized weight >= 0.30: runs every iteration.
    Required,
    /// Weight above zero but below 0.30: runs when intensity allows.
    Optional,
    /// Weight exactly zero: never runs in this phase.
    Forbidden,
}

/// Raw weight profile over the four steps. Non-negative, not required to
/// sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepWeights {
    pub observe: f64,
    pub orient: f64,
    pub decide: f64,
    pub act: f64,
}

impl StepWeights {
    pub fn get(&self, step: OodaStep) -> f64 {
        match step {
            OodaStep::Observe => self.observe,
            OodaStep::Orient => self.orient,
            OodaStep::Decide => self.decide,
            OodaStep::Act => self.act,
        }
    }

    fn total(&self) -> f64 {
        self.observe + self.orient + self.decide + self.act
    }

    /// Weight of one step divided by the profile total. Zero-total profiles
    /// normalize to zero everywhere.
    pub fn normalized(&self, step: OodaStep) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        self.get(step) / total
    }

    pub fn requirement(&self, step: OodaStep) -> StepRequirement {
        let raw = self.get(step);
        if raw == 0.0 {
            return StepRequirement::Forbidden;
        }
        if self.normalized(step) >= REQUIRED_WEIGHT_THRESHOLD {
            StepRequirement::Required
        } else {
            StepRequirement::Optional
        }
    }
}

/// Normalized weight at or above this makes a step required each iteration.
pub const REQUIRED_WEIGHT_THRESHOLD: f64 = 0.30;

// ============================================================================
// Phase Catalog
// ============================================================================

/// Static definitions of the 7 phases: step weight profiles and legal
/// transitions.
#[derive(Debug, Clone)]
pub struct PhaseCatalog {
    _private: (),
}

impl PhaseCatalog {
    pub fn standard() -> Self {
        Self { _private: () }
    }

    /// Weight profile for a phase. Early phases are observation-heavy,
    /// Validation and Solution are act-heavy.
    pub fn weights(&self, phase: Phase) -> StepWeights {
        match phase {
            Phase::Intake => StepWeights {
                observe: 0.70,
                orient: 0.30,
                decide: 0.0,
                act: 0.0,
            },
            Phase::BlastRadius => StepWeights {
                observe: 0.50,
                orient: 0.30,
                decide: 0.20,
                act: 0.0,
            },
            Phase::Timeline => StepWeights {
                observe: 0.55,
                orient: 0.35,
                decide: 0.10,
                act: 0.0,
            },
            Phase::Hypothesis => StepWeights {
                observe: 0.15,
                orient: 0.45,
                decide: 0.40,
                act: 0.0,
            },
            Phase::Validation => StepWeights {
                observe: 0.30,
                orient: 0.10,
                decide: 0.10,
                act: 0.50,
            },
            Phase::Solution => StepWeights {
                observe: 0.0,
                orient: 0.15,
                decide: 0.35,
                act: 0.50,
            },
            Phase::Document => StepWeights {
                observe: 0.10,
                orient: 0.30,
                decide: 0.10,
                act: 0.50,
            },
        }
    }

    /// Per-step requirements for a phase, derived from the weight profile.
    pub fn requirements(&self, phase: Phase) -> [(OodaStep, StepRequirement); 4] {
        let weights = self.weights(phase);
        let mut out = [(OodaStep::Observe, StepRequirement::Forbidden); 4];
        for (slot, step) in out.iter_mut().zip(OodaStep::all()) {
            *slot = (step, weights.requirement(step));
        }
        out
    }

    pub fn required_steps(&self, phase: Phase) -> Vec<OodaStep> {
        self.requirements(phase)
            .iter()
            .filter(|(_, r)| *r == StepRequirement::Required)
            .map(|(s, _)| *s)
            .collect()
    }

    pub fn optional_steps(&self, phase: Phase) -> Vec<OodaStep> {
        self.requirements(phase)
            .iter()
            .filter(|(_, r)| *r == StepRequirement::Optional)
            .map(|(s, _)| *s)
            .collect()
    }

    /// The catalog's designated successor of a phase.
    pub fn next_ordinal_phase(&self, phase: Phase) -> Option<Phase> {
        phase.next()
    }

    /// Check whether a transition is sanctioned without loop-back
    /// authorization.
    ///
    /// Legal without the router: staying put, advancing to the designated
    /// successor, and the critical-urgency skips (Intake -> Solution,
    /// BlastRadius -> Solution). Backward jumps must come through the
    /// loop-back router and are rejected here.
    pub fn can_transition(
        &self,
        from: Phase,
        to: Phase,
        critical_urgency_confirmed: bool,
    ) -> Result<(), VigilError> {
        if from == to {
            return Ok(());
        }
        if from.next() == Some(to) {
            return Ok(());
        }
        if to == Phase::Solution
            && matches!(from, Phase::Intake | Phase::BlastRadius)
            && critical_urgency_confirmed
        {
            return Ok(());
        }
        let reason = if to.ordinal() < from.ordinal() {
            "backward jumps require loop-back authorization".to_string()
        } else if from.is_terminal() {
            "document is terminal".to_string()
        } else {
            format!("{} is not the designated successor of {}", to, from)
        };
        Err(VigilError::InvalidTransition { from, to, reason })
    }
}

impl Default for PhaseCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// Tests
// ============================================================================
