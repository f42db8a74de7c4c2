//! Vigil Common - Shared investigation domain model
//!
//! Everything the orchestration engine (vigild) and future front-ends agree on:
//! the phase catalog, the hypothesis ledger, the investigation aggregate,
//! evidence types, engine configuration and the error taxonomy.
//!
//! No I/O lives here. Every type round-trips through serde losslessly so an
//! investigation can be persisted between turns and reloaded by case id.

pub mod config;
pub mod error;
pub mod evidence;
pub mod hypothesis;
pub mod investigation;
pub mod phase;

pub use config::*;
pub use error::*;
pub use evidence::*;
pub use hypothesis::*;
pub use investigation::*;
pub use phase::*;
