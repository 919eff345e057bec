//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured events, one span per component)
//!     → metrics.rs (reload, process, inbound and camo counters)
//!
//! Consumers:
//!     → stdout (JSON or human-readable)
//!     → Metrics endpoint (Prometheus scrape), when the manifest enables it
//! ```
//!
//! # Design Decisions
//! - Only `main` installs the global subscriber and exporter
//! - Components receive their span at construction
//! - Metric updates without an installed exporter are no-ops

pub mod logging;
pub mod metrics;
