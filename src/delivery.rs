//! Artifact delivery.
//!
//! Finalization hands the encoded capture artifact to a [`Delivery`]
//! implementation that persists it under the rendered filename.
//! [`DirDelivery`] writes into a target directory; hosts with their own
//! download facility implement the trait instead.

use std::path::PathBuf;

use tracing::info;

use crate::capture::CaptureArtifact;
use crate::error::{RecorderError, Result};

/// Persists a named blob to the user's filesystem.
#[async_trait::async_trait]
pub trait Delivery: Send + Sync {
    /// Store `artifact` under `filename` (no extension; implementations
    /// append one from the artifact's MIME type).
    async fn deliver(&self, filename: &str, artifact: &CaptureArtifact) -> Result<()>;
}

/// Delivery into a fixed directory.
pub struct DirDelivery {
    dir: PathBuf,
}

impl DirDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait::async_trait]
impl Delivery for DirDelivery {
    async fn deliver(&self, filename: &str, artifact: &CaptureArtifact) -> Result<()> {
        let path = self.dir.join(format!("{filename}.{}", artifact.extension()));

        tokio::fs::create_dir_all(&self.dir).await.map_err(|err| {
            RecorderError::delivery(filename, format!("cannot create output directory: {err}"))
        })?;
        tokio::fs::write(&path, &artifact.data).await.map_err(|err| {
            RecorderError::delivery(filename, format!("cannot write {}: {err}", path.display()))
        })?;

        info!(path = %path.display(), bytes = artifact.data.len(), "recording delivered");
        Ok(())
    }
}
