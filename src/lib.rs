//! Reflector: provisions, configures and supervises an edge proxy and a
//! protocol-proxy core from a declarative manifest, fronting them with
//! cached camouflage content.

pub mod camo;
pub mod config;
pub mod lifecycle;
pub mod manifest;
pub mod model;
pub mod net;
pub mod observability;
pub mod orchestrator;
pub mod provision;
pub mod resilience;
pub mod supervisor;
pub mod version;

pub use config::Settings;
pub use lifecycle::Shutdown;
pub use manifest::Manifest;
pub use model::{CoreConfig, EdgeConfig};
pub use orchestrator::{Deployment, Orchestrator};
