//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → every `triggered()` future resolves → Deployment::stop
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: edge first, then core
//! - No shutdown deadline; a hung binary blocks exit

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_termination;
