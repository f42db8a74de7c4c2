//! Hypothesis Ledger - candidate root-cause lifecycle
//!
//! Owns creation, confidence decay, anchoring-bias detection and forced
//! diversification for the investigation's hypothesis set.
//!
//! Invariants:
//! - Likelihood is always clamped to [0, 1]
//! - Validated is reached through evidence at >= 0.70, never assigned directly
//! - Refuted requires likelihood < 0.30
//! - Decay applies only while a hypothesis is being tested, one 0.85 factor
//!   per iteration without progress, and never drives likelihood to zero

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::EngineConfig;

// ============================================================================
// Category and Status
// ============================================================================

/// Fixed taxonomy of root-cause categories. Anchoring detection counts
/// saturation within one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisCategory {
    Infrastructure,
    Code,
    Configuration,
    ExternalDependency,
    Network,
    Security,
    ResourceExhaustion,
}

impl HypothesisCategory {
    pub fn all() -> [HypothesisCategory; 7] {
        [
            HypothesisCategory::Infrastructure,
            HypothesisCategory::Code,
            HypothesisCategory::Configuration,
            HypothesisCategory::ExternalDependency,
            HypothesisCategory::Network,
            HypothesisCategory::Security,
            HypothesisCategory::ResourceExhaustion,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HypothesisCategory::Infrastructure => "infrastructure",
            HypothesisCategory::Code => "code",
            HypothesisCategory::Configuration => "configuration",
            HypothesisCategory::ExternalDependency => "external_dependency",
            HypothesisCategory::Network => "network",
            HypothesisCategory::Security => "security",
            HypothesisCategory::ResourceExhaustion => "resource_exhaustion",
        }
    }
}

impl std::fmt::Display for HypothesisCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    /// Suggested by the collaborator, not yet taken up.
    Proposed,
    /// Accepted into the ledger, awaiting a test plan.
    Captured,
    /// Actively being tested. The only status that decays.
    Testing,
    /// Reached the validation threshold through evidence.
    Validated,
    /// Driven below the refutation threshold.
    Refuted,
    /// Shelved without a verdict.
    Retired,
    /// Replaced by a sharper restatement.
    Superseded,
}

impl HypothesisStatus {
    /// Refuted/Retired/Superseded hypotheses are out of play.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HypothesisStatus::Refuted | HypothesisStatus::Retired | HypothesisStatus::Superseded
        )
    }

    /// Only hypotheses under active test decay.
    pub fn decays(&self) -> bool {
        matches!(self, HypothesisStatus::Testing)
    }
}

impl std::fmt::Display for HypothesisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HypothesisStatus::Proposed => "proposed",
            HypothesisStatus::Captured => "captured",
            HypothesisStatus::Testing => "testing",
            HypothesisStatus::Validated => "validated",
            HypothesisStatus::Refuted => "refuted",
            HypothesisStatus::Retired => "retired",
            HypothesisStatus::Superseded => "superseded",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Hypothesis
// ============================================================================

/// One recorded likelihood movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub turn: u64,
    pub likelihood: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A candidate root cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub statement: String,
    pub category: HypothesisCategory,
    /// Always in [0, 1].
    pub likelihood: f64,
    pub status: HypothesisStatus,
    pub supporting_evidence: Vec<String>,
    pub refuting_evidence: Vec<String>,
    /// Consecutive iterations with no evidence or confidence movement.
    pub iterations_without_progress: u32,
    pub last_progress_turn: u64,
    pub created_turn: u64,
    /// Full confidence history, seeded at creation.
    pub trajectory: Vec<TrajectoryPoint>,
}

impl Hypothesis {
    pub fn is_in_play(&self) -> bool {
        !self.status.is_terminal()
    }
}

// ============================================================================
// Anchoring Detection
// ============================================================================

/// Why the ledger believes the investigation is anchoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchoringReason {
    /// Too many testing hypotheses share one category.
    SameCategorySaturation(HypothesisCategory),
    /// A hypothesis has gone too long without progress.
    StalledHypothesis,
    /// A high-confidence hypothesis keeps failing to progress.
    PersistentHighConfidenceFailure,
}

impl std::fmt::Display for AnchoringReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnchoringReason::SameCategorySaturation(cat) => {
                write!(f, "same-category saturation in {cat}")
            }
            AnchoringReason::StalledHypothesis => write!(f, "stalled hypothesis"),
            AnchoringReason::PersistentHighConfidenceFailure => {
                write!(f, "persistent high-confidence failure")
            }
        }
    }
}

/// Result of an anchoring check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchoringCheck {
    pub triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<AnchoringReason>,
    /// Categories the next hypotheses should come from.
    pub suggested_categories: Vec<HypothesisCategory>,
}

impl AnchoringCheck {
    fn clear() -> Self {
        Self {
            triggered: false,
            reason: None,
            suggested_categories: Vec::new(),
        }
    }
}

// ============================================================================
// Hypothesis Ledger
// ============================================================================

/// Lifecycle manager for the hypothesis set. Holds the engine thresholds;
/// the hypotheses themselves live on the investigation aggregate.
#[derive(Debug, Clone)]
pub struct HypothesisLedger {
    config: EngineConfig,
}

impl HypothesisLedger {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a new hypothesis in Proposed status, trajectory seeded with
    /// the initial likelihood.
    pub fn create(
        &self,
        statement: &str,
        category: HypothesisCategory,
        initial_likelihood: f64,
        turn: u64,
    ) -> Hypothesis {
        let likelihood = initial_likelihood.clamp(0.0, 1.0);
        Hypothesis {
            id: Uuid::new_v4().to_string(),
            statement: statement.to_string(),
            category,
            likelihood,
            status: HypothesisStatus::Proposed,
            supporting_evidence: Vec::new(),
            refuting_evidence: Vec::new(),
            iterations_without_progress: 0,
            last_progress_turn: turn,
            created_turn: turn,
            trajectory: vec![TrajectoryPoint {
                turn,
                likelihood,
                reason: Some("created".to_string()),
            }],
        }
    }

    /// Apply one iteration's confidence decay to a stalled hypothesis.
    ///
    /// Called once per iteration without progress, so the cumulative effect
    /// is `initial x 0.85^iterations_without_progress`. Only Testing
    /// hypotheses decay; the floor keeps likelihood strictly above zero.
    /// Returns true if likelihood moved.
    pub fn apply_confidence_decay(&self, h: &mut Hypothesis, current_turn: u64) -> bool {
        if !h.status.decays() {
            return false;
        }
        h.iterations_without_progress += 1;
        let before = h.likelihood;
        h.likelihood = (h.likelihood * self.config.decay_factor).max(self.config.decay_floor);
        if h.likelihood != before {
            debug!(
                hypothesis = %h.id,
                stalled_iterations = h.iterations_without_progress,
                likelihood = h.likelihood,
                "confidence decay applied"
            );
            h.trajectory.push(TrajectoryPoint {
                turn: current_turn,
                likelihood: h.likelihood,
                reason: Some("confidence decay".to_string()),
            });
        }
        h.likelihood != before
    }

    /// Record an evidence-driven confidence change.
    ///
    /// Resets the stall counter, appends a trajectory point, and applies the
    /// automatic promotions: Validated at the validation threshold, Refuted
    /// below the refutation threshold (from Testing only).
    pub fn update_confidence(&self, h: &mut Hypothesis, new_likelihood: f64, turn: u64, reason: &str) {
        let likelihood = new_likelihood.clamp(0.0, 1.0);
        h.likelihood = likelihood;
        h.iterations_without_progress = 0;
        h.last_progress_turn = turn;
        h.trajectory.push(TrajectoryPoint {
            turn,
            likelihood,
            reason: Some(reason.to_string()),
        });

        if h.status.is_terminal() {
            return;
        }
        if likelihood >= self.config.validation_threshold {
            debug!(hypothesis = %h.id, likelihood, "hypothesis validated");
            h.status = HypothesisStatus::Validated;
        } else if likelihood < self.config.refutation_threshold
            && h.status == HypothesisStatus::Testing
        {
            debug!(hypothesis = %h.id, likelihood, "hypothesis refuted");
            h.status = HypothesisStatus::Refuted;
        } else if h.status == HypothesisStatus::Validated {
            // Evidence pulled a validated hypothesis back under the bar.
            h.status = HypothesisStatus::Testing;
        }
    }

    /// Detect anchoring bias. Triggers are checked in order; first match
    /// wins:
    ///
    /// 1. Saturation: too many testing hypotheses in one category
    /// 2. Any hypothesis stalled past the threshold
    /// 3. A high-confidence hypothesis stalled past the threshold
    pub fn detect_anchoring(&self, hypotheses: &[Hypothesis], iteration_index: u32) -> AnchoringCheck {
        // Trigger 1: same-category saturation among testing hypotheses.
        for category in HypothesisCategory::all() {
            let testing_in_category = hypotheses
                .iter()
                .filter(|h| h.status == HypothesisStatus::Testing && h.category == category)
                .count();
            if testing_in_category >= self.config.anchoring_saturation {
                debug!(
                    %category,
                    count = testing_in_category,
                    iteration = iteration_index,
                    "anchoring: category saturated"
                );
                return AnchoringCheck {
                    triggered: true,
                    reason: Some(AnchoringReason::SameCategorySaturation(category)),
                    suggested_categories: HypothesisCategory::all()
                        .into_iter()
                        .filter(|c| *c != category)
                        .collect(),
                };
            }
        }

        // Trigger 2: any stalled hypothesis.
        let stalled: Vec<&Hypothesis> = hypotheses
            .iter()
            .filter(|h| h.is_in_play() && h.iterations_without_progress >= self.config.stall_threshold)
            .collect();
        if let Some(first) = stalled.first() {
            // A stall where every stalled hypothesis is high-confidence is
            // the more specific failure; report it as such.
            let reason = if stalled
                .iter()
                .all(|h| h.likelihood > self.config.high_confidence_threshold)
            {
                AnchoringReason::PersistentHighConfidenceFailure
            } else {
                AnchoringReason::StalledHypothesis
            };
            debug!(hypothesis = %first.id, ?reason, "anchoring: stall detected");
            let stalled_categories: Vec<HypothesisCategory> =
                stalled.iter().map(|h| h.category).collect();
            return AnchoringCheck {
                triggered: true,
                reason: Some(reason),
                suggested_categories: HypothesisCategory::all()
                    .into_iter()
                    .filter(|c| !stalled_categories.contains(c))
                    .collect(),
            };
        }

        AnchoringCheck::clear()
    }

    /// Categories to request fresh hypotheses from, least-represented first.
    /// Used by the intervention coordinator when countering anchoring.
    pub fn force_alternative_generation(
        &self,
        hypotheses: &[Hypothesis],
        turn: u64,
    ) -> Vec<HypothesisCategory> {
        let mut counts: Vec<(HypothesisCategory, usize)> = HypothesisCategory::all()
            .into_iter()
            .map(|c| {
                let n = hypotheses
                    .iter()
                    .filter(|h| h.is_in_play() && h.category == c)
                    .count();
                (c, n)
            })
            .collect();
        counts.sort_by_key(|(_, n)| *n);
        debug!(turn, "forcing alternative hypothesis generation");
        counts.into_iter().map(|(c, _)| c).collect()
    }

    /// Up to `max_count` hypotheses worth testing next, ordered by
    /// likelihood descending. Terminal statuses are excluded.
    pub fn testable_hypotheses<'a>(
        &self,
        hypotheses: &'a [Hypothesis],
        max_count: usize,
    ) -> Vec<&'a Hypothesis> {
        let mut candidates: Vec<&Hypothesis> =
            hypotheses.iter().filter(|h| h.is_in_play()).collect();
        candidates.sort_by(|a, b| {
            b.likelihood
                .partial_cmp(&a.likelihood)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(max_count);
        candidates
    }

    /// First validated hypothesis, if any.
    pub fn validated<'a>(&self, hypotheses: &'a [Hypothesis]) -> Option<&'a Hypothesis> {
        hypotheses
            .iter()
            .find(|h| h.status == HypothesisStatus::Validated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ledger() -> HypothesisLedger {
        HypothesisLedger::new(EngineConfig::default())
    }

    fn testing_hypothesis(
        ledger: &HypothesisLedger,
        category: HypothesisCategory,
        likelihood: f64,
    ) -> Hypothesis {
        let mut h = ledger.create("test hypothesis", category, likelihood, 1);
        h.status = HypothesisStatus::Testing;
        h
    }

    #[test]
    fn test_create_seeds_trajectory() {
        let ledger = ledger();
        let h = ledger.create("pods OOMKilled", HypothesisCategory::ResourceExhaustion, 0.6, 3);
        assert_eq!(h.status, HypothesisStatus::Proposed);
        assert_eq!(h.trajectory.len(), 1);
        assert_eq!(h.trajectory[0].turn, 3);
        assert_eq!(h.trajectory[0].likelihood, 0.6);
        assert_eq!(h.iterations_without_progress, 0);
    }

    #[test]
    fn test_create_clamps_likelihood() {
        let ledger = ledger();
        let h = ledger.create("x", HypothesisCategory::Code, 1.7, 0);
        assert_eq!(h.likelihood, 1.0);
        let h = ledger.create("x", HypothesisCategory::Code, -0.2, 0);
        assert_eq!(h.likelihood, 0.0);
    }

    #[test]
    fn test_decay_single_iteration() {
        let ledger = ledger();
        let mut h = testing_hypothesis(&ledger, HypothesisCategory::Code, 0.80);
        assert!(ledger.apply_confidence_decay(&mut h, 5));
        assert_relative_eq!(h.likelihood, 0.68, epsilon = 0.01);
        assert_eq!(h.iterations_without_progress, 1);
    }

    #[test]
    fn test_decay_three_iterations() {
        let ledger = ledger();
        let mut h = testing_hypothesis(&ledger, HypothesisCategory::Code, 0.70);
        for turn in 5..8 {
            ledger.apply_confidence_decay(&mut h, turn);
        }
        assert_eq!(h.iterations_without_progress, 3);
        assert_relative_eq!(h.likelihood, 0.43, epsilon = 0.01);
    }

    #[test]
    fn test_decay_only_while_testing() {
        let ledger = ledger();
        for status in [
            HypothesisStatus::Proposed,
            HypothesisStatus::Captured,
            HypothesisStatus::Validated,
            HypothesisStatus::Refuted,
            HypothesisStatus::Retired,
            HypothesisStatus::Superseded,
        ] {
            let mut h = ledger.create("x", HypothesisCategory::Network, 0.8, 0);
            h.status = status;
            assert!(!ledger.apply_confidence_decay(&mut h, 1), "{status} must not decay");
            assert_eq!(h.likelihood, 0.8);
        }
    }

    #[test]
    fn test_decay_never_reaches_zero() {
        let ledger = ledger();
        let mut h = testing_hypothesis(&ledger, HypothesisCategory::Code, 0.05);
        for turn in 0..100 {
            ledger.apply_confidence_decay(&mut h, turn);
        }
        assert!(h.likelihood > 0.0);
    }

    #[test]
    fn test_update_confidence_resets_stall_counter() {
        let ledger = ledger();
        let mut h = testing_hypothesis(&ledger, HypothesisCategory::Code, 0.5);
        h.iterations_without_progress = 2;
        ledger.update_confidence(&mut h, 0.55, 7, "new log evidence");
        assert_eq!(h.iterations_without_progress, 0);
        assert_eq!(h.last_progress_turn, 7);
        assert_eq!(h.trajectory.last().unwrap().likelihood, 0.55);
    }

    #[test]
    fn test_auto_promotion_at_threshold() {
        let ledger = ledger();
        let mut h = testing_hypothesis(&ledger, HypothesisCategory::Configuration, 0.6);
        ledger.update_confidence(&mut h, 0.70, 4, "confirmed by deploy diff");
        assert_eq!(h.status, HypothesisStatus::Validated);
    }

    #[test]
    fn test_auto_demotion_below_threshold() {
        let ledger = ledger();
        let mut h = testing_hypothesis(&ledger, HypothesisCategory::Network, 0.5);
        ledger.update_confidence(&mut h, 0.15, 4, "packet captures clean");
        assert_eq!(h.status, HypothesisStatus::Refuted);
    }

    #[test]
    fn test_update_clamps_out_of_range() {
        let ledger = ledger();
        let mut h = testing_hypothesis(&ledger, HypothesisCategory::Code, 0.5);
        ledger.update_confidence(&mut h, 1.4, 4, "");
        assert_eq!(h.likelihood, 1.0);
        assert_eq!(h.status, HypothesisStatus::Validated);
    }

    #[test]
    fn test_anchoring_needs_four_same_category() {
        let ledger = ledger();
        let mut hypotheses: Vec<Hypothesis> = (0..3)
            .map(|_| testing_hypothesis(&ledger, HypothesisCategory::Code, 0.5))
            .collect();
        let check = ledger.detect_anchoring(&hypotheses, 5);
        assert!(!check.triggered, "3 same-category hypotheses never trigger");

        hypotheses.push(testing_hypothesis(&ledger, HypothesisCategory::Code, 0.5));
        let check = ledger.detect_anchoring(&hypotheses, 5);
        assert!(check.triggered);
        assert_eq!(
            check.reason,
            Some(AnchoringReason::SameCategorySaturation(HypothesisCategory::Code))
        );
        assert!(!check.suggested_categories.contains(&HypothesisCategory::Code));
        assert_eq!(check.suggested_categories.len(), 6);
    }

    #[test]
    fn test_anchoring_saturation_ignores_refuted() {
        let ledger = ledger();
        let mut hypotheses: Vec<Hypothesis> = (0..4)
            .map(|_| testing_hypothesis(&ledger, HypothesisCategory::Code, 0.5))
            .collect();
        hypotheses[0].status = HypothesisStatus::Refuted;
        let check = ledger.detect_anchoring(&hypotheses, 5);
        assert!(!check.triggered);
    }

    #[test]
    fn test_anchoring_stalled_hypothesis() {
        let ledger = ledger();
        let mut h = testing_hypothesis(&ledger, HypothesisCategory::Network, 0.5);
        h.iterations_without_progress = 3;
        let check = ledger.detect_anchoring(&[h], 6);
        assert!(check.triggered);
        assert_eq!(check.reason, Some(AnchoringReason::StalledHypothesis));
        assert!(!check.suggested_categories.contains(&HypothesisCategory::Network));
    }

    #[test]
    fn test_anchoring_persistent_high_confidence() {
        let ledger = ledger();
        let mut h = testing_hypothesis(&ledger, HypothesisCategory::Security, 0.9);
        h.iterations_without_progress = 3;
        let check = ledger.detect_anchoring(&[h], 6);
        assert!(check.triggered);
        assert_eq!(
            check.reason,
            Some(AnchoringReason::PersistentHighConfidenceFailure)
        );
    }

    #[test]
    fn test_saturation_checked_before_stall() {
        let ledger = ledger();
        let mut hypotheses: Vec<Hypothesis> = (0..4)
            .map(|_| testing_hypothesis(&ledger, HypothesisCategory::Code, 0.5))
            .collect();
        hypotheses[0].iterations_without_progress = 5;
        let check = ledger.detect_anchoring(&hypotheses, 8);
        assert_eq!(
            check.reason,
            Some(AnchoringReason::SameCategorySaturation(HypothesisCategory::Code))
        );
    }

    #[test]
    fn test_force_alternatives_prefers_unused_categories() {
        let ledger = ledger();
        let hypotheses = vec![
            testing_hypothesis(&ledger, HypothesisCategory::Code, 0.5),
            testing_hypothesis(&ledger, HypothesisCategory::Code, 0.4),
        ];
        let suggested = ledger.force_alternative_generation(&hypotheses, 9);
        assert_eq!(suggested.len(), 7);
        assert_eq!(*suggested.last().unwrap(), HypothesisCategory::Code);
    }

    #[test]
    fn test_testable_ordering_and_exclusions() {
        let ledger = ledger();
        let mut low = testing_hypothesis(&ledger, HypothesisCategory::Code, 0.3);
        low.statement = "low".to_string();
        let mut high = testing_hypothesis(&ledger, HypothesisCategory::Network, 0.9);
        high.statement = "high".to_string();
        let mut refuted = testing_hypothesis(&ledger, HypothesisCategory::Security, 0.95);
        refuted.status = HypothesisStatus::Refuted;

        let hypotheses = vec![low, high, refuted];
        let testable = ledger.testable_hypotheses(&hypotheses, 2);
        assert_eq!(testable.len(), 2);
        assert_eq!(testable[0].statement, "high");
        assert_eq!(testable[1].statement, "low");
    }

    #[test]
    fn test_validated_lookup() {
        let ledger = ledger();
        let mut hypotheses = vec![testing_hypothesis(&ledger, HypothesisCategory::Code, 0.6)];
        assert!(ledger.validated(&hypotheses).is_none());
        hypotheses[0].status = HypothesisStatus::Validated;
        assert!(ledger.validated(&hypotheses).is_some());
    }
}
