//! Declarative deployment manifest.
//!
//! The header (`apiVersion`, `kind`) is decoded first and selects the body
//! schema. Only `Reflector`/`v1` exists today.

pub mod loader;
pub mod schema;

use thiserror::Error;

pub use loader::{load_manifest, parse_manifest};
pub use schema::{
    CamoSecurity, CamoSpec, InboundSpec, Manifest, ManifestSpec, MetricsSpec, OutboundSpec, RouteSpec,
    UserSpec,
};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("unsupported manifest kind {kind:?} version {api_version:?}")]
    UnsupportedKind { kind: String, api_version: String },
}
