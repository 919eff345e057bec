//! Configuration push strategies.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("admin request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("admin endpoint answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("config file write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("config render failed: {0}")]
    Render(#[from] serde_json::Error),
}

/// How a running process receives a new configuration.
#[derive(Debug, Clone)]
pub enum PushStrategy {
    /// POST the full JSON document; only 200 counts as success.
    AdminApi { url: String, client: reqwest::Client },
    /// Rewrite the file the process was started with. No reread signal is sent.
    ConfigFile { path: PathBuf },
}

impl PushStrategy {
    pub fn admin_api(url: impl Into<String>) -> Self {
        Self::AdminApi {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn config_file(path: impl Into<PathBuf>) -> Self {
        Self::ConfigFile { path: path.into() }
    }

    /// Arguments for `<binary> ...` at start.
    pub fn run_args(&self) -> Vec<OsString> {
        match self {
            Self::AdminApi { .. } => vec!["run".into()],
            Self::ConfigFile { path } => vec!["run".into(), "-c".into(), path.into()],
        }
    }

    pub async fn push(&self, body: Vec<u8>) -> Result<(), PushError> {
        match self {
            Self::AdminApi { url, client } => {
                let response = client
                    .post(url)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body)
                    .send()
                    .await?;
                let status = response.status();
                if status != reqwest::StatusCode::OK {
                    let body = response.text().await.unwrap_or_default();
                    return Err(PushError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                tracing::debug!(status = status.as_u16(), "config upload succeeded");
                Ok(())
            }
            Self::ConfigFile { path } => {
                write_atomically(path, &body).await?;
                tracing::debug!(path = %path.display(), "config file rewritten");
                Ok(())
            }
        }
    }
}

async fn write_atomically(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut staging = OsString::from(path.as_os_str());
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    tokio::fs::write(&staging, body).await?;
    tokio::fs::rename(&staging, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_args() {
        assert_eq!(PushStrategy::admin_api("http://localhost:2019/load").run_args(), vec![OsString::from("run")]);
        assert_eq!(
            PushStrategy::config_file("/etc/core.json").run_args(),
            vec![OsString::from("run"), "-c".into(), "/etc/core.json".into()]
        );
    }

    #[tokio::test]
    async fn test_config_file_push_rewrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("core.json");
        std::fs::write(&path, "old").unwrap();

        PushStrategy::config_file(&path).push(b"{}\n".to_vec()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");
        assert!(!dir.path().join("core.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_admin_push_unreachable() {
        let strategy = PushStrategy::admin_api("http://127.0.0.1:9/load");
        assert!(matches!(strategy.push(b"{}".to_vec()).await, Err(PushError::Http(_))));
    }
}
