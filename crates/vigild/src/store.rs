//! State Store - per-case persistence with optimistic concurrency
//!
//! Investigations are keyed by case id (never by ephemeral session id) and
//! round-trip losslessly between turns. Saves carry a compare-and-swap on
//! the revision number: two concurrent submissions for the same case cannot
//! silently merge, the second gets a retryable conflict instead.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use vigil_common::{InvestigationState, VigilError};

// ============================================================================
// Trait
// ============================================================================

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the latest revision of a case, if it exists.
    async fn load(&self, case_id: &str) -> Result<Option<InvestigationState>, VigilError>;

    /// Persist a case. The stored revision must equal `state.revision` or
    /// the save is rejected with a retryable conflict. Returns the new
    /// revision; the caller writes it back onto the aggregate.
    async fn save(&self, state: &InvestigationState) -> Result<u64, VigilError>;
}

fn check_revision(
    case_id: &str,
    stored: Option<u64>,
    submitted: u64,
) -> Result<u64, VigilError> {
    match stored {
        Some(found) if found != submitted => Err(VigilError::RevisionConflict {
            case_id: case_id.to_string(),
            expected: submitted,
            found,
        }),
        _ => Ok(submitted + 1),
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// HashMap-backed store, the default for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    cases: Mutex<HashMap<String, InvestigationState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, case_id: &str) -> Result<Option<InvestigationState>, VigilError> {
        let cases = self.cases.lock().expect("state store lock poisoned");
        Ok(cases.get(case_id).cloned())
    }

    async fn save(&self, state: &InvestigationState) -> Result<u64, VigilError> {
        let mut cases = self.cases.lock().expect("state store lock poisoned");
        let stored = cases.get(&state.case_id).map(|s| s.revision);
        let next = check_revision(&state.case_id, stored, state.revision)?;
        let mut to_store = state.clone();
        to_store.revision = next;
        cases.insert(state.case_id.clone(), to_store);
        debug!(case = %state.case_id, revision = next, "case saved");
        Ok(next)
    }
}

// ============================================================================
// JSON Directory Store
// ============================================================================

/// One pretty-printed JSON file per case under a root directory. The case
/// file is the permanent record; it is never deleted, only rewritten.
#[derive(Debug)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn case_path(&self, case_id: &str) -> PathBuf {
        self.root.join(format!("{case_id}.json"))
    }
}

#[async_trait]
impl StateStore for JsonDirStore {
    async fn load(&self, case_id: &str) -> Result<Option<InvestigationState>, VigilError> {
        let path = self.case_path(case_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        let state: InvestigationState = serde_json::from_str(&raw)?;
        Ok(Some(state))
    }

    async fn save(&self, state: &InvestigationState) -> Result<u64, VigilError> {
        std::fs::create_dir_all(&self.root)?;
        let stored = self.load(&state.case_id).await?.map(|s| s.revision);
        let next = check_revision(&state.case_id, stored, state.revision)?;
        let mut to_store = state.clone();
        to_store.revision = next;
        let json = serde_json::to_string_pretty(&to_store)?;
        std::fs::write(self.case_path(&state.case_id), json)?;
        debug!(case = %state.case_id, revision = next, "case file written");
        Ok(next)
    }
}

// ============================================================================
// Tests
// ============================================================================
