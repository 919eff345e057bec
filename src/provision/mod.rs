//! Managed binary provisioning.
//!
//! # Data Flow
//! ```text
//! `<binary> version` → VersionReport → installed SemVer
//!     → up to date and archive cached? done
//!     → otherwise download.rs (release archive) → archive.rs (single entry) → chmod 755
//! ```
//!
//! # Design Decisions
//! - A missing or silent binary counts as 0.0.0
//! - A cached archive alone never triggers extraction; the binary must be
//!   missing or stale
//! - Every failure is fatal to startup

pub mod archive;
pub mod download;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{Instrument, Span};

use crate::config::schema::render_release_url;
use crate::config::{CoreSettings, EdgeSettings};
use crate::version::{InvalidVersion, SemVer, VersionReport};

pub use archive::ArchiveFormat;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("desired version: {0}")]
    Version(#[from] InvalidVersion),

    #[error("download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unsupported archive format: {0}")]
    UnsupportedArchive(PathBuf),

    #[error("entry {entry:?} not found in {archive}")]
    EntryNotFound { entry: String, archive: PathBuf },

    #[error("zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// What [`BinaryProvisioner::ensure`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Installed version matched and the archive was already cached.
    UpToDate,
    /// The archive was fetched; the binary was (re)extracted when needed.
    Installed,
}

/// Ensures a correctly versioned executable exists at `binary_path`.
pub struct BinaryProvisioner {
    desired: SemVer,
    binary_path: PathBuf,
    archive_path: PathBuf,
    archive_entry: String,
    release_url: String,
    report: VersionReport,
    client: reqwest::Client,
    span: Span,
}

impl BinaryProvisioner {
    pub fn for_edge(settings: &EdgeSettings, span: Span) -> Result<Self, ProvisionError> {
        let desired = settings.desired_version()?;
        Ok(Self {
            desired,
            binary_path: PathBuf::from(&settings.binary_path),
            archive_path: PathBuf::from(&settings.archive_path),
            archive_entry: settings.archive_entry.clone(),
            release_url: render_release_url(&settings.release_url, desired),
            report: VersionReport::LeadingToken,
            client: reqwest::Client::new(),
            span,
        })
    }

    pub fn for_core(settings: &CoreSettings, span: Span) -> Result<Self, ProvisionError> {
        let desired = settings.desired_version()?;
        Ok(Self {
            desired,
            binary_path: PathBuf::from(&settings.binary_path),
            archive_path: PathBuf::from(&settings.archive_path),
            archive_entry: settings.archive_entry.clone(),
            release_url: render_release_url(&settings.release_url, desired),
            report: VersionReport::SecondToken,
            client: reqwest::Client::new(),
            span,
        })
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    pub fn release_url(&self) -> &str {
        &self.release_url
    }

    /// Version reported by the installed binary, 0.0.0 when absent or unreadable.
    pub async fn installed_version(&self) -> SemVer {
        let output = match tokio::process::Command::new(&self.binary_path)
            .arg("version")
            .output()
            .await
        {
            Ok(output) if output.status.success() => output,
            Ok(_) | Err(_) => return SemVer::ZERO,
        };
        let text = String::from_utf8_lossy(&output.stdout);
        self.report.installed(&text).unwrap_or(SemVer::ZERO)
    }

    pub async fn ensure(&self) -> Result<ProvisionOutcome, ProvisionError> {
        self.ensure_inner().instrument(self.span.clone()).await
    }

    async fn ensure_inner(&self) -> Result<ProvisionOutcome, ProvisionError> {
        let installed = self.installed_version().await;
        let archive_cached = tokio::fs::try_exists(&self.archive_path).await.unwrap_or(false);
        let current = installed == self.desired;

        if archive_cached && current {
            tracing::debug!(
                current_version = %installed,
                desired_version = %self.desired,
                "installed binary is current"
            );
            return Ok(ProvisionOutcome::UpToDate);
        }

        tracing::info!(
            current_version = %installed,
            desired_version = %self.desired,
            url = %self.release_url,
            "new binary required, downloading"
        );
        download::download_file(&self.client, &self.release_url, &self.archive_path).await?;

        let binary_present = tokio::fs::try_exists(&self.binary_path).await.unwrap_or(false);
        if !binary_present || !current {
            let format = ArchiveFormat::from_path(&self.archive_path)
                .ok_or_else(|| ProvisionError::UnsupportedArchive(self.archive_path.clone()))?;
            let archive = self.archive_path.clone();
            let entry = self.archive_entry.clone();
            let dest = self.binary_path.clone();
            tokio::task::spawn_blocking(move || archive::extract_entry(format, &archive, &entry, &dest))
                .await??;
            tracing::info!(binary = %self.binary_path.display(), "binary extracted");
        }

        tokio::fs::set_permissions(&self.binary_path, std::fs::Permissions::from_mode(0o755)).await?;
        Ok(ProvisionOutcome::Installed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_script(path: &Path, body: &str) {
        std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[tokio::test]
    async fn test_missing_binary_reports_zero() {
        let dir = TempDir::new().unwrap();
        let mut settings = CoreSettings::default();
        settings.binary_path = dir.path().join("absent").display().to_string();

        let provisioner = BinaryProvisioner::for_core(&settings, Span::none()).unwrap();
        assert_eq!(provisioner.installed_version().await, SemVer::ZERO);
    }

    #[tokio::test]
    async fn test_current_binary_with_cached_archive_is_untouched() {
        let dir = TempDir::new().unwrap();
        let binary = dir.path().join("caddy-bin");
        let archive = dir.path().join("caddy.deb");
        write_script(&binary, "echo 'v2.9.0 h1:abcdef='");
        std::fs::write(&archive, b"cached").unwrap();

        let mut settings = EdgeSettings::default();
        settings.binary_path = binary.display().to_string();
        settings.archive_path = archive.display().to_string();
        settings.release_url = "http://127.0.0.1:9/{tag}/caddy.deb".to_string();

        let provisioner = BinaryProvisioner::for_edge(&settings, Span::none()).unwrap();
        assert_eq!(provisioner.installed_version().await, SemVer::new(2, 9, 0));
        assert_eq!(provisioner.ensure().await.unwrap(), ProvisionOutcome::UpToDate);
        assert_eq!(std::fs::read(&archive).unwrap(), b"cached");
    }

    #[tokio::test]
    async fn test_stale_binary_requires_download() {
        let dir = TempDir::new().unwrap();
        let binary = dir.path().join("xray-bin");
        write_script(&binary, "echo 'Xray 1.0.0 (Xray, Penetrates Everything.)'");

        let mut settings = CoreSettings::default();
        settings.binary_path = binary.display().to_string();
        settings.archive_path = dir.path().join("xray.zip").display().to_string();
        settings.release_url = "http://127.0.0.1:9/{tag}/xray.zip".to_string();

        let provisioner = BinaryProvisioner::for_core(&settings, Span::none()).unwrap();
        assert_eq!(provisioner.release_url(), "http://127.0.0.1:9/v25.9.11/xray.zip");
        assert!(matches!(
            provisioner.ensure().await,
            Err(ProvisionError::Download { .. })
        ));
    }
}
