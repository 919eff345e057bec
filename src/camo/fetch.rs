//! Artifact fetch backends, selected by template scheme.

use std::future::Future;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use super::registry::{ImageReference, RegistryClient};
use super::CamoError;

/// Fetches the artifact named by `template` into `dest`.
///
/// `dest` does not exist when this is called; its parent does.
pub trait ArtifactFetcher: Send + Sync {
    fn fetch(&self, template: &str, dest: &Path) -> impl Future<Output = Result<(), CamoError>> + Send;
}

/// Where a template points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source<'a> {
    Registry(String),
    Local(&'a Path),
}

/// Registry pulls and local directory copies.
#[derive(Debug, Clone)]
pub struct ArtifactBackend {
    registry: RegistryClient,
    default_registry: String,
}

impl ArtifactBackend {
    pub fn new(client: reqwest::Client, default_registry: impl Into<String>) -> Self {
        Self {
            registry: RegistryClient::new(client),
            default_registry: default_registry.into(),
        }
    }

    /// Classify a template by its scheme prefix.
    pub fn source<'a>(&self, template: &'a str) -> Source<'a> {
        if let Some(image) = template
            .strip_prefix("docker://")
            .or_else(|| template.strip_prefix("oci://"))
        {
            Source::Registry(image.to_string())
        } else if template.starts_with("./") || template.starts_with('/') {
            Source::Local(Path::new(template))
        } else {
            let registry = self.default_registry.trim_end_matches('/');
            Source::Registry(format!("{}/{}", registry, template))
        }
    }
}

impl ArtifactFetcher for ArtifactBackend {
    async fn fetch(&self, template: &str, dest: &Path) -> Result<(), CamoError> {
        match self.source(template) {
            Source::Registry(image) => {
                let reference = ImageReference::parse(&image)?;
                tracing::info!(
                    registry = %reference.registry,
                    repository = %reference.repository,
                    reference = %reference.reference,
                    "pulling camo image"
                );
                self.registry.pull(&reference, dest).await
            }
            Source::Local(source) => {
                tracing::info!(source = %source.display(), "copying camo directory");
                let source = source.to_path_buf();
                let dest = dest.to_path_buf();
                tokio::task::spawn_blocking(move || copy_tree(&source, &dest)).await??;
                Ok(())
            }
        }
    }
}

/// Recursive copy; symlinks are recreated, not followed.
pub fn copy_tree(source: &Path, dest: &Path) -> io::Result<()> {
    let meta = std::fs::metadata(source)?;
    if !meta.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", source.display()),
        ));
    }

    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let target = dest.join(relative);
        let kind = entry.file_type();
        if kind.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if kind.is_symlink() {
            std::os::unix::fs::symlink(std::fs::read_link(entry.path())?, &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
