//! Container registry pull (Docker Registry HTTP API v2).
//!
//! # Responsibilities
//! - Parse image references (`[registry/]repository[:tag|@digest]`)
//! - Anonymous bearer-token challenges
//! - Resolve manifest lists / OCI indexes to linux/amd64
//! - Apply layers in order, honoring whiteouts, confined to the destination

use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;

use super::CamoError;

const DOCKER_HUB: &str = "docker.io";
const DOCKER_HUB_API: &str = "registry-1.docker.io";

const MANIFEST_TYPES: &str = "application/vnd.oci.image.index.v1+json, \
    application/vnd.docker.distribution.manifest.list.v2+json, \
    application/vnd.oci.image.manifest.v1+json, \
    application/vnd.docker.distribution.manifest.v2+json";

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    /// Tag or digest.
    pub reference: String,
}

impl ImageReference {
    pub fn parse(raw: &str) -> Result<Self, CamoError> {
        let invalid = || CamoError::InvalidReference(raw.to_string());
        if raw.is_empty() || raw.contains(char::is_whitespace) {
            return Err(invalid());
        }

        let (registry, remainder) = match raw.split_once('/') {
            Some((head, tail)) if head.contains(['.', ':']) || head == "localhost" => {
                (head.to_string(), tail)
            }
            _ => (DOCKER_HUB.to_string(), raw),
        };

        let (name, reference) = if let Some((name, digest)) = remainder.split_once('@') {
            (name, digest.to_string())
        } else {
            match remainder.rsplit_once(':') {
                Some((name, tag)) if !tag.contains('/') => (name, tag.to_string()),
                _ => (remainder, "latest".to_string()),
            }
        };
        if name.is_empty() || reference.is_empty() {
            return Err(invalid());
        }

        let repository = if registry == DOCKER_HUB && !name.contains('/') {
            format!("library/{}", name)
        } else {
            name.to_string()
        };

        Ok(Self {
            registry,
            repository,
            reference,
        })
    }

    fn base_url(&self) -> String {
        let host = if self.registry == DOCKER_HUB {
            DOCKER_HUB_API
        } else {
            self.registry.as_str()
        };
        let scheme = if host.starts_with("localhost") || host.starts_with("127.") {
            "http"
        } else {
            "https"
        };
        format!("{}://{}/v2/{}", scheme, host, self.repository)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    #[serde(default)]
    media_type: String,
    #[serde(default)]
    manifests: Vec<PlatformManifest>,
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
struct PlatformManifest {
    digest: String,
    #[serde(default)]
    platform: Option<Platform>,
}

#[derive(Debug, Deserialize)]
struct Platform {
    architecture: String,
    os: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    #[serde(default)]
    media_type: String,
    digest: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: String,
    #[serde(default)]
    access_token: String,
}

/// Anonymous registry client.
#[derive(Debug, Clone, Default)]
pub struct RegistryClient {
    client: reqwest::Client,
}

impl RegistryClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Pull `image` and unpack its filesystem into `dest`.
    pub async fn pull(&self, image: &ImageReference, dest: &Path) -> Result<(), CamoError> {
        let base = image.base_url();
        let mut token = None;

        let manifest_url = format!("{}/manifests/{}", base, image.reference);
        let mut manifest: Manifest = self
            .get(&manifest_url, Some(MANIFEST_TYPES), &mut token)
            .await?
            .json()
            .await?;

        if !manifest.manifests.is_empty() {
            let digest = manifest
                .manifests
                .iter()
                .find(|m| {
                    m.platform
                        .as_ref()
                        .is_some_and(|p| p.os == "linux" && p.architecture == "amd64")
                })
                .map(|m| m.digest.clone())
                .ok_or_else(|| CamoError::Registry("no linux/amd64 image in index".to_string()))?;
            let url = format!("{}/manifests/{}", base, digest);
            manifest = self
                .get(&url, Some(MANIFEST_TYPES), &mut token)
                .await?
                .json()
                .await?;
        }
        if manifest.layers.is_empty() {
            return Err(CamoError::Registry(format!(
                "manifest {:?} has no layers",
                manifest.media_type
            )));
        }

        tokio::fs::create_dir_all(dest).await?;
        for layer in &manifest.layers {
            let url = format!("{}/blobs/{}", base, layer.digest);
            let blob = self.get(&url, None, &mut token).await?.bytes().await?;
            tracing::debug!(digest = %layer.digest, bytes = blob.len(), "applying layer");

            let gzipped = layer.media_type.ends_with("gzip") || blob.starts_with(&[0x1f, 0x8b]);
            let dest = dest.to_path_buf();
            tokio::task::spawn_blocking(move || {
                if gzipped {
                    apply_layer(GzDecoder::new(blob.as_ref()), &dest)
                } else {
                    apply_layer(blob.as_ref(), &dest)
                }
            })
            .await??;
        }
        Ok(())
    }

    /// GET with a single anonymous bearer-token retry on 401.
    async fn get(
        &self,
        url: &str,
        accept: Option<&str>,
        token: &mut Option<String>,
    ) -> Result<Response, CamoError> {
        let response = self.send(url, accept, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response.error_for_status()?);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| CamoError::Registry(format!("401 without challenge for {}", url)))?;
        let fresh = self.fetch_token(challenge).await?;
        let response = self.send(url, accept, Some(&fresh)).await?;
        *token = Some(fresh);
        Ok(response.error_for_status()?)
    }

    async fn send(&self, url: &str, accept: Option<&str>, token: Option<&str>) -> Result<Response, CamoError> {
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        Ok(request.send().await?)
    }

    async fn fetch_token(&self, challenge: &str) -> Result<String, CamoError> {
        let params = parse_challenge(challenge)
            .ok_or_else(|| CamoError::Registry(format!("unsupported auth challenge: {}", challenge)))?;
        let realm = params
            .iter()
            .find(|(k, _)| k == "realm")
            .map(|(_, v)| v.clone())
            .ok_or_else(|| CamoError::Registry("auth challenge without realm".to_string()))?;
        let query: Vec<(String, String)> = params.into_iter().filter(|(k, _)| k != "realm").collect();

        let response: TokenResponse = self
            .client
            .get(&realm)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !response.token.is_empty() {
            Ok(response.token)
        } else if !response.access_token.is_empty() {
            Ok(response.access_token)
        } else {
            Err(CamoError::Registry("token endpoint returned no token".to_string()))
        }
    }
}

/// `Bearer realm="...",service="...",scope="..."` → key/value pairs.
fn parse_challenge(header: &str) -> Option<Vec<(String, String)>> {
    let rest = header.trim().strip_prefix("Bearer ")?;
    let mut params = Vec::new();
    for part in rest.split(',') {
        let (key, value) = part.trim().split_once('=')?;
        params.push((key.trim().to_string(), value.trim().trim_matches('"').to_string()));
    }
    Some(params)
}

/// Unpack one image layer over `dest`.
pub fn apply_layer<R: Read>(reader: R, dest: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_overwrite(true);
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let Some(relative) = confined(&path) else {
            tracing::warn!(path = %path.display(), "skipping layer entry outside destination");
            continue;
        };
        let file_name = relative
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let parent = dest.join(relative.parent().unwrap_or_else(|| Path::new("")));

        if file_name == ".wh..wh..opq" {
            clear_directory(&parent)?;
        } else if let Some(hidden) = file_name.strip_prefix(".wh.") {
            remove_path(&parent.join(hidden))?;
        } else {
            entry.unpack_in(dest)?;
        }
    }
    Ok(())
}

/// Relative, normalized form of `path`, or `None` if it could escape.
fn confined(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) | Component::ParentDir => return None,
        }
    }
    Some(out)
}

fn clear_directory(dir: &Path) -> io::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        remove_path(&entry?.path())?;
    }
    Ok(())
}

fn remove_path(path: &Path) -> io::Result<()> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
