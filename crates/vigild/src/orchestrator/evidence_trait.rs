//! Evidence Store Trait Abstraction
//!
//! Two read-only queries plus a completeness score. The engine never writes
//! evidence; collection happens outside and items arrive already classified
//! by polarity.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use vigil_common::EvidenceItem;

// ============================================================================
// Trait
// ============================================================================

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Items recorded strictly after the given turn.
    async fn evidence_since(&self, turn: u64) -> Result<Vec<EvidenceItem>>;

    /// Items answering specific evidence requests.
    async fn evidence_for(&self, request_ids: &[String]) -> Result<Vec<EvidenceItem>>;

    /// Fraction of the given requests that have been answered, 0..1.
    async fn completeness_ratio(&self, request_ids: &[String]) -> Result<f64>;
}

// ============================================================================
// Fake Evidence Store (Testing)
// ============================================================================

/// In-memory fake. Push items with a turn stamp; completeness is computed
/// from which request ids actually have items.
#[derive(Debug, Default)]
pub struct FakeEvidenceStore {
    items: Mutex<Vec<EvidenceItem>>,
}

impl FakeEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: EvidenceItem) {
        self.items.lock().expect("evidence lock poisoned").push(item);
    }
}

#[async_trait]
impl EvidenceStore for FakeEvidenceStore {
    async fn evidence_since(&self, turn: u64) -> Result<Vec<EvidenceItem>> {
        let items = self.items.lock().expect("evidence lock poisoned");
        Ok(items.iter().filter(|i| i.turn > turn).cloned().collect())
    }

    async fn evidence_for(&self, request_ids: &[String]) -> Result<Vec<EvidenceItem>> {
        let items = self.items.lock().expect("evidence lock poisoned");
        Ok(items
            .iter()
            .filter(|i| request_ids.contains(&i.id))
            .cloned()
            .collect())
    }

    async fn completeness_ratio(&self, request_ids: &[String]) -> Result<f64> {
        if request_ids.is_empty() {
            return Ok(1.0);
        }
        let items = self.items.lock().expect("evidence lock poisoned");
        let answered = request_ids
            .iter()
            .filter(|id| items.iter().any(|i| &i.id == *id))
            .count();
        Ok(answered as f64 / request_ids.len() as f64)
    }
}

// ============================================================================
// Tests
// ============================================================================
