//! Runtime settings subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML, optional)
//!     → loader.rs (read & deserialize, defaults for everything missing)
//!     → validation.rs (semantic checks)
//!     → Settings (validated, immutable)
//!     → shared via Arc with provisioning, supervisors and the camo cache
//! ```
//!
//! # Design Decisions
//! - Settings describe *how* to run the managed binaries; the declarative
//!   manifest (see `crate::manifest`) describes *what* to deploy
//! - All fields have defaults so a missing file is a valid configuration
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_settings, ConfigError};
pub use schema::CamoConfig;
pub use schema::CoreSettings;
pub use schema::EdgeSettings;
pub use schema::ObservabilityConfig;
pub use schema::ReloadConfig;
pub use schema::Settings;
