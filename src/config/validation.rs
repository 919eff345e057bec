//! Settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Versions must parse, templates must reference a version
//! - Retry budget must be usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Settings → Result<(), Vec<ValidationError>>
//! - Runs before settings are handed to any subsystem

use std::fmt;

use crate::config::schema::Settings;

/// A single semantic problem in the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check the settings, collecting every error.
pub fn validate_settings(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut fail = |field: &'static str, message: String| {
        errors.push(ValidationError { field, message });
    };

    if let Err(e) = settings.edge.desired_version() {
        fail("edge.version", e.to_string());
    }
    if let Err(e) = settings.core.desired_version() {
        fail("core.version", e.to_string());
    }

    for (field, template) in [
        ("edge.release_url", &settings.edge.release_url),
        ("core.release_url", &settings.core.release_url),
    ] {
        if !template.contains("{tag}") && !template.contains("{version}") {
            fail(field, "must contain {tag} or {version}".to_string());
        }
    }

    for (field, value) in [
        ("edge.binary_path", &settings.edge.binary_path),
        ("edge.archive_path", &settings.edge.archive_path),
        ("edge.archive_entry", &settings.edge.archive_entry),
        ("core.binary_path", &settings.core.binary_path),
        ("core.archive_path", &settings.core.archive_path),
        ("core.archive_entry", &settings.core.archive_entry),
        ("core.config_path", &settings.core.config_path),
        ("camo.directory", &settings.camo.directory),
    ] {
        if value.trim().is_empty() {
            fail(field, "must not be empty".to_string());
        }
    }

    if url::Url::parse(&settings.edge.admin_url).is_err() {
        fail("edge.admin_url", format!("not a valid URL: {}", settings.edge.admin_url));
    }

    if settings.reload.max_attempts == 0 {
        fail("reload.max_attempts", "must be at least 1".to_string());
    }
    if settings.reload.initial_delay_ms > settings.reload.max_delay_ms {
        fail(
            "reload.initial_delay_ms",
            "must not exceed reload.max_delay_ms".to_string(),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_settings(&Settings::default()).is_ok());
    }

    #[test]
    fn test_all_errors_collected() {
        let mut settings = Settings::default();
        settings.edge.version = "latest".to_string();
        settings.core.config_path = String::new();
        settings.reload.initial_delay_ms = 120_000;

        let errors = validate_settings(&settings).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["edge.version", "core.config_path", "reload.initial_delay_ms"]
        );
    }
}
