//! Network probing subsystem.
//!
//! # Data Flow
//! ```text
//! orchestrator, per inbound
//!     → probe.rs: is the public port bindable?
//!     → probe.rs: does the camo FQDN resolve? to a local interface?
//!     → probe.rs: free loopback port for a core proxy behind the edge
//! ```
//!
//! # Design Decisions
//! - All probes sit behind [`NetworkProbe`] so reconciliation is testable
//!   without touching real sockets or DNS
//! - Probes are point-in-time answers; a port may be taken right after

pub mod probe;

pub use probe::{NetworkProbe, SystemNetwork};
