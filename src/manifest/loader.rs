//! Manifest loading.

use std::path::Path;

use serde::Deserialize;

use super::schema::Manifest;
use super::ManifestError;

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(rename = "apiVersion", default)]
    api_version: String,
    #[serde(default)]
    kind: String,
}

/// Read and parse a manifest file.
pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let content = std::fs::read_to_string(path)?;
    parse_manifest(&content)
}

/// Parse a manifest, dispatching on its header.
pub fn parse_manifest(content: &str) -> Result<Manifest, ManifestError> {
    let header: Header = serde_yaml::from_str(content)?;
    match (header.kind.as_str(), header.api_version.as_str()) {
        ("Reflector", "v1") => Ok(serde_yaml::from_str(content)?),
        _ => {
            tracing::error!(kind = %header.kind, api_version = %header.api_version, "unknown manifest kind");
            Err(ManifestError::UnsupportedKind {
                kind: header.kind,
                api_version: header.api_version,
            })
        }
    }
}
