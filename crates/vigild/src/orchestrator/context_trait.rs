//! Context Sink Trait Abstraction
//!
//! The hierarchical-memory compressor is an external collaborator: the
//! engine hands it every completed iteration (write-only) and asks for a
//! bounded summary when assembling prompt context. How compression happens
//! is not the engine's concern.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use vigil_common::OodaIteration;

// ============================================================================
// Trait
// ============================================================================

#[async_trait]
pub trait ContextSink: Send + Sync {
    /// Absorb one completed iteration.
    async fn absorb_iteration(&self, iteration: &OodaIteration) -> Result<()>;

    /// Summary of the investigation so far, within a token budget.
    async fn context_summary(&self, max_tokens: usize) -> Result<String>;
}

// ============================================================================
// Implementations
// ============================================================================

/// Discards everything. Useful when the caller assembles context itself.
#[derive(Debug, Default)]
pub struct NoopContextSink;

#[async_trait]
impl ContextSink for NoopContextSink {
    async fn absorb_iteration(&self, _iteration: &OodaIteration) -> Result<()> {
        Ok(())
    }

    async fn context_summary(&self, _max_tokens: usize) -> Result<String> {
        Ok(String::new())
    }
}

/// Keeps a one-line digest per iteration and truncates to the budget,
/// newest first. A stand-in for the real compressor, also used in tests.
#[derive(Debug, Default)]
pub struct MemoryContextSink {
    lines: Mutex<Vec<String>>,
}

/// Rough chars-per-token factor used to honor the budget.
const CHARS_PER_TOKEN: usize = 4;

impl MemoryContextSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextSink for MemoryContextSink {
    async fn absorb_iteration(&self, iteration: &OodaIteration) -> Result<()> {
        let mut line = format!(
            "[turn {} {} #{}] evidence={} tested={} progress={}",
            iteration.turn,
            iteration.phase,
            iteration.number,
            iteration.evidence_collected,
            iteration.hypotheses_tested.len(),
            iteration.made_progress(),
        );
        if let Some(insights) = &iteration.insights {
            line.push_str(": ");
            line.push_str(insights);
        }
        self.lines.lock().expect("context lock poisoned").push(line);
        Ok(())
    }

    async fn context_summary(&self, max_tokens: usize) -> Result<String> {
        let lines = self.lines.lock().expect("context lock poisoned");
        let budget = max_tokens * CHARS_PER_TOKEN;
        let mut out: Vec<&str> = Vec::new();
        let mut used = 0;
        for line in lines.iter().rev() {
            if used + line.len() > budget {
                break;
            }
            used += line.len() + 1;
            out.push(line);
        }
        out.reverse();
        Ok(out.join("\n"))
    }
}

// ============================================================================
// Tests
// ============================================================================
