//! Settings schema definitions.
//!
//! This module defines how the managed binaries are obtained and run.
//! All types derive Serde traits for deserialization from the settings file.

use serde::{Deserialize, Serialize};

use crate::version::{InvalidVersion, SemVer};

/// Root settings for reflector.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Edge proxy (reverse proxy / static server) binary and admin API.
    pub edge: EdgeSettings,

    /// Core proxy binary and its on-disk config.
    pub core: CoreSettings,

    /// Camouflage content cache.
    pub camo: CamoConfig,

    /// Backoff policy for configuration pushes.
    pub reload: ReloadConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Edge proxy settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EdgeSettings {
    /// Desired release version (e.g., "2.9.0" or "v2.9.0").
    pub version: String,

    /// Where the executable lives.
    pub binary_path: String,

    /// Where the downloaded release archive is kept.
    pub archive_path: String,

    /// Release URL template; `{tag}` renders "v1.2.3", `{version}` renders "1.2.3".
    pub release_url: String,

    /// Path of the executable inside the release package.
    pub archive_entry: String,

    /// Admin endpoint accepting a full JSON config via POST.
    pub admin_url: String,

    /// Plain HTTP port of the edge proxy.
    pub http_port: u16,
}

impl Default for EdgeSettings {
    fn default() -> Self {
        Self {
            version: "2.9.0".to_string(),
            binary_path: "./caddy-bin".to_string(),
            archive_path: "/tmp/caddy.deb".to_string(),
            release_url:
                "https://github.com/caddyserver/caddy/releases/download/{tag}/caddy_{version}_linux_amd64.deb"
                    .to_string(),
            archive_entry: "./usr/bin/caddy".to_string(),
            admin_url: "http://localhost:2019/load".to_string(),
            http_port: 80,
        }
    }
}

/// Core proxy settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoreSettings {
    /// Desired release version (e.g., "25.9.11").
    pub version: String,

    /// Where the executable lives.
    pub binary_path: String,

    /// Where the downloaded release archive is kept.
    pub archive_path: String,

    /// Release URL template; `{tag}` renders "v1.2.3", `{version}` renders "1.2.3".
    pub release_url: String,

    /// Name of the executable inside the release archive.
    pub archive_entry: String,

    /// Config file the core proxy is started with and reloaded through.
    pub config_path: String,

    /// Log level written into the generated config.
    pub log_level: String,

    /// Routing domain strategy written into the generated config.
    pub domain_strategy: String,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            version: "25.9.11".to_string(),
            binary_path: "./xray-bin".to_string(),
            archive_path: "/tmp/Xray-linux-64.zip".to_string(),
            release_url:
                "https://github.com/XTLS/Xray-core/releases/download/{tag}/Xray-linux-64.zip"
                    .to_string(),
            archive_entry: "xray".to_string(),
            config_path: "./xray-config.json".to_string(),
            log_level: "warning".to_string(),
            domain_strategy: "AsIs".to_string(),
        }
    }
}

/// Camouflage cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CamoConfig {
    /// Directory holding one subdirectory per loaded template.
    pub directory: String,

    /// Registry prepended to bare image names.
    pub default_registry: String,

    /// Re-fetch templates that are on disk but not yet accounted for.
    pub always_pull: bool,
}

impl Default for CamoConfig {
    fn default() -> Self {
        Self {
            directory: "/tmp/camo".to_string(),
            default_registry: "docker.io/library".to_string(),
            always_pull: false,
        }
    }
}

/// Configuration push retry settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Delay after the first failure, in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound for a single delay, in milliseconds.
    pub max_delay_ms: u64,

    /// Total attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            max_attempts: 100,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: true,
        }
    }
}

/// Render a release URL template for `version`.
pub fn render_release_url(template: &str, version: SemVer) -> String {
    template
        .replace("{tag}", &version.render(true))
        .replace("{version}", &version.render(false))
}

impl EdgeSettings {
    pub fn desired_version(&self) -> Result<SemVer, InvalidVersion> {
        self.version.parse()
    }
}

impl CoreSettings {
    pub fn desired_version(&self) -> Result<SemVer, InvalidVersion> {
        self.version.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_url_rendering() {
        let url = render_release_url(&EdgeSettings::default().release_url, SemVer::new(2, 9, 0));
        assert_eq!(
            url,
            "https://github.com/caddyserver/caddy/releases/download/v2.9.0/caddy_2.9.0_linux_amd64.deb"
        );

        let url = render_release_url(&CoreSettings::default().release_url, SemVer::new(25, 9, 11));
        assert!(url.contains("/download/v25.9.11/Xray-linux-64.zip"));
    }

    #[test]
    fn test_default_versions_parse() {
        assert_eq!(EdgeSettings::default().desired_version(), Ok(SemVer::new(2, 9, 0)));
        assert_eq!(CoreSettings::default().desired_version(), Ok(SemVer::new(25, 9, 11)));
    }
}
