//! Evidence types shared with the external evidence store.
//!
//! The engine never collects evidence itself; it consumes read-only items
//! from the store and attaches them to hypotheses by polarity.

use serde::{Deserialize, Serialize};

/// Whether a piece of evidence supports or undermines a hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidencePolarity {
    Supportive,
    Refuting,
    Neutral,
}

/// One item returned by the evidence store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Store-assigned id, referenced from hypothesis evidence lists.
    pub id: String,
    /// Hypothesis this item bears on, if the store could attribute it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hypothesis_id: Option<String>,
    pub polarity: EvidencePolarity,
    /// Free-text findings, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<String>,
    /// Turn on which the store recorded this item.
    pub turn: u64,
}

impl EvidenceItem {
    pub fn supportive(id: &str, hypothesis_id: &str, turn: u64) -> Self {
        Self {
            id: id.to_string(),
            hypothesis_id: Some(hypothesis_id.to_string()),
            polarity: EvidencePolarity::Supportive,
            findings: None,
            turn,
        }
    }

    pub fn refuting(id: &str, hypothesis_id: &str, turn: u64) -> Self {
        Self {
            id: id.to_string(),
            hypothesis_id: Some(hypothesis_id.to_string()),
            polarity: EvidencePolarity::Refuting,
            findings: None,
            turn,
        }
    }

    pub fn with_findings(mut self, findings: &str) -> Self {
        self.findings = Some(findings.to_string());
        self
    }
}
