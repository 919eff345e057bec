//! Desired-state configuration trees for the managed services.
//!
//! # Data Flow
//! ```text
//! orchestrator (ensure-or-create calls)
//!     → edge.rs (reverse proxy / static server JSON)
//!     → core.rs (protocol proxy JSON)
//!     → serde_json → admin endpoint or config file
//!
//! persisted JSON → serde → KeyedList (indices rebuilt while decoding)
//! ```
//!
//! # Design Decisions
//! - Every keyed collection is a [`KeyedList`]: ordered iteration and key
//!   lookup live in one container, so the two can never drift apart
//! - `ensure_*` returns a mutable borrow; handles are re-acquired by key
//! - Append-only: there is no removal path
//! - Empty and zero fields are omitted on output

pub mod core;
pub mod edge;
pub mod keyed;
pub mod link;
pub mod reality;

pub use self::core::CoreConfig;
pub use edge::EdgeConfig;
pub use keyed::{Keyed, KeyedList};
pub use link::{ConnectionLink, LinkError};

/// `skip_serializing_if` helper for sections that are still at their defaults.
pub(crate) fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}
