//! Settings loading from disk.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::schema::Settings;
use crate::config::validation::{validate_settings, ValidationError};

/// Error type for settings loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate settings from a TOML file.
///
/// A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let settings = match fs::read_to_string(path) {
        Ok(content) => parse_settings(&content)?,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "settings file not found, using defaults");
            Settings::default()
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };

    validate_settings(&settings).map_err(ConfigError::Validation)?;

    Ok(settings)
}

/// Parse settings from TOML text without validating them.
pub fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}
