//! Artifact delivery.
//!
//! An [`ArtifactSink`] takes a finished [`Artifact`] and makes it available
//! to the user. The CLI writes artifacts into a directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use transforge_common::paths::sanitize_name;

use crate::transcode::Artifact;

/// Receives finished artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Deliver `artifact`, returning where it ended up.
    async fn deliver(&self, artifact: &Artifact) -> Result<PathBuf>;
}

/// Writes artifacts into a directory under their sanitized names.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn deliver(&self, artifact: &Artifact) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create output directory: {:?}", self.dir))?;

        let name = match sanitize_name(&artifact.name) {
            n if n.is_empty() || n == "." || n == ".." => "artifact".to_string(),
            n => n,
        };
        let path = self.dir.join(name);
        tokio::fs::write(&path, &artifact.bytes)
            .await
            .with_context(|| format!("Failed to write artifact: {:?}", path))?;

        tracing::info!(
            path = %path.display(),
            mime_type = %artifact.mime_type,
            size_bytes = artifact.size_bytes(),
            "Artifact delivered"
        );
        Ok(path)
    }
}
