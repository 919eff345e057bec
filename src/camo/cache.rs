//! Content-addressed camo cache.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{Instrument, Span};

use super::fetch::ArtifactFetcher;
use super::naming::internal_name;
use super::CamoError;
use crate::observability::metrics;

/// Maps templates to local directories under one cache root.
pub struct CamoCache<F> {
    directory: PathBuf,
    fetcher: F,
    /// template → path, for templates reconciled by this process.
    locations: DashMap<String, PathBuf>,
    /// internal name → lock serializing filesystem work for that name.
    locks: DashMap<String, Arc<Mutex<()>>>,
    span: Span,
}

impl<F: ArtifactFetcher> CamoCache<F> {
    pub fn new(directory: impl Into<PathBuf>, fetcher: F) -> Self {
        Self {
            directory: directory.into(),
            fetcher,
            locations: DashMap::new(),
            locks: DashMap::new(),
            span: tracing::info_span!("camo_cache", component = "camo"),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// On-disk location a template would occupy.
    pub fn path_for(&self, template: &str) -> PathBuf {
        self.directory.join(internal_name(template))
    }

    /// Make `template` available locally and record where.
    ///
    /// A template already recorded returns at once. A directory already on
    /// disk is adopted unless `always_pull` is set, in which case it is
    /// removed and fetched again.
    pub async fn preload(&self, template: &str, always_pull: bool) -> Result<PathBuf, CamoError> {
        if let Some(path) = self.locations.get(template) {
            return Ok(path.clone());
        }
        self.preload_locked(template, always_pull)
            .instrument(self.span.clone())
            .await
    }

    async fn preload_locked(&self, template: &str, always_pull: bool) -> Result<PathBuf, CamoError> {
        let name = internal_name(template);
        let lock = self.locks.entry(name.clone()).or_default().clone();
        let _guard = lock.lock().await;

        // Another preload of the same name may have finished while we waited.
        if let Some(path) = self.locations.get(template) {
            return Ok(path.clone());
        }

        let path = self.directory.join(&name);
        match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_dir() && !always_pull => {
                tracing::info!(template, path = %path.display(), "adopting camo already on disk");
                self.locations.insert(template.to_string(), path.clone());
                return Ok(path);
            }
            Ok(meta) if meta.is_dir() => {
                tracing::info!(template, path = %path.display(), "removing camo for fresh pull");
                tokio::fs::remove_dir_all(&path).await?;
            }
            Ok(_) => {
                tracing::warn!(path = %path.display(), "removing non-directory at camo path");
                tokio::fs::remove_file(&path).await?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tokio::fs::create_dir_all(&self.directory).await?;
        if let Err(e) = self.fetcher.fetch(template, &path).await {
            tracing::error!(template, error = %e, "camo fetch failed");
            metrics::record_camo_fetch("failure");
            if let Err(cleanup) = remove_partial(&path).await {
                tracing::warn!(path = %path.display(), error = %cleanup, "failed to clean partial camo");
            }
            return Err(e);
        }

        metrics::record_camo_fetch("success");
        tracing::info!(template, path = %path.display(), "camo loaded");
        self.locations.insert(template.to_string(), path.clone());
        Ok(path)
    }

    /// Recorded location of a previously preloaded template.
    ///
    /// Only consults what this process has loaded, never the filesystem.
    pub fn location(&self, template: &str) -> Result<PathBuf, CamoError> {
        self.locations
            .get(template)
            .map(|path| path.clone())
            .ok_or_else(|| CamoError::NotLoaded(template.to_string()))
    }

    /// Number of templates recorded.
    pub fn loaded(&self) -> usize {
        self.locations.len()
    }
}

async fn remove_partial(path: &Path) -> io::Result<()> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
