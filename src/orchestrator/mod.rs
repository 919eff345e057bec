//! Deployment orchestration.
//!
//! # Data Flow
//! ```text
//! Manifest
//!     → apply.rs: camos (resolve, preload) → inbounds (probe, place, secure)
//!                 → outbounds → routing rules
//!     → CoreConfig + EdgeConfig (ensure-or-create only)
//!     → deployment.rs: start core → start edge + push → wait → stop edge → stop core
//! ```
//!
//! # Design Decisions
//! - One bad declaration never blocks the others; it becomes a `SkipReason`
//! - Validation for an inbound finishes before any config is touched
//! - Activation fails only when no inbound activated

pub mod apply;
pub mod deployment;

use thiserror::Error;

pub use apply::{ApplyReport, ExportedLink, Orchestrator, SkipReason, SkippedEntry};
pub use deployment::Deployment;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no inbounds were activated ({skipped} skipped)")]
    NoInboundsActivated { skipped: usize },
}
