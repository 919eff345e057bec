//! Release archive download.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use super::ProvisionError;

/// Stream `url` into `dest`, replacing it only once the body is complete.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<u64, ProvisionError> {
    let wrap = |source: reqwest::Error| ProvisionError::Download {
        url: url.to_string(),
        source,
    };

    let response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(wrap)?;

    let partial = partial_path(dest);
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut written = 0u64;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(wrap)?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&partial, dest).await?;
    tracing::debug!(url, bytes = written, dest = %dest.display(), "download complete");
    Ok(written)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}
