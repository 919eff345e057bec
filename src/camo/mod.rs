//! Camouflage content cache.
//!
//! # Data Flow
//! ```text
//! template ("nginx:latest", "oci://ghcr.io/org/site:v1", "./site", ...)
//!     → naming.rs (`<name>-<sha256(template)>`)
//!     → cache.rs (accounting map, per-name lock, on-disk check)
//!     → fetch.rs (scheme dispatch) → registry.rs | local directory copy
//!     → `<camo dir>/<internal name>/` served by the edge proxy
//! ```
//!
//! # Design Decisions
//! - The directory on disk is the truth; the in-memory map only records
//!   what this process has already reconciled
//! - `location` never touches the filesystem
//! - Concurrent preloads of one template are serialized by name

pub mod cache;
pub mod fetch;
pub mod naming;
pub mod registry;

use thiserror::Error;

pub use cache::CamoCache;
pub use fetch::{ArtifactBackend, ArtifactFetcher};
pub use naming::internal_name;

#[derive(Debug, Error)]
pub enum CamoError {
    #[error("camo {0:?} was never loaded")]
    NotLoaded(String),

    #[error("invalid image reference {0:?}")]
    InvalidReference(String),

    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry: {0}")]
    Registry(String),

    #[error("unpack task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
