//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Configuration push to a managed process:
//!     → retries.rs (run the push, stop on first success)
//!     → On failure: backoff.rs (next delay, doubling up to the cap)
//!     → Budget exhausted: report failure to the caller, never abort it
//! ```
//!
//! # Design Decisions
//! - Deterministic delays: 1s, 2s, 4s ... capped at 60s, 100 attempts
//! - The loop blocks the calling task; callers keep at most one push in flight
//! - Every failed attempt is logged with the upcoming delay

pub mod backoff;
pub mod retries;

pub use retries::{retry_with_backoff, RetryPolicy, RetryReport};
