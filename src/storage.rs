use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::AppError;

/// Blob storage for event photos, addressed by slash-separated paths such as
/// `/events/{organizer}/{name}.webp`.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, path: &str, content_type: &str) -> Result<(), AppError>;
    async fn remove(&self, path: &str) -> Result<(), AppError>;
}

/// Stores files under a directory on local disk.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if relative.as_os_str().is_empty() || escapes {
            return Err(AppError::InvalidArgument(format!("invalid storage path `{path}`")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, bytes: Vec<u8>, path: &str, content_type: &str) -> Result<(), AppError> {
        let target = self.resolve(path)?;
        let write = async {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, &bytes).await
        };
        write.await.map_err(|e| {
            warn!(error = %e, path, "upload failed");
            AppError::Upstream("failed to upload file".to_string())
        })?;
        debug!(path, content_type, size = bytes.len(), "stored file");
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), AppError> {
        let target = self.resolve(path)?;
        tokio::fs::remove_file(&target).await.map_err(|e| {
            warn!(error = %e, path, "remove failed");
            AppError::Upstream("failed to remove file".to_string())
        })
    }
}

/// File extension for an accepted photo content type.
pub fn photo_extension(content_type: &str) -> Result<&'static str, AppError> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/webp" => Ok("webp"),
        "image/jpeg" | "image/jpg" => Ok("jpg"),
        "image/png" => Ok("png"),
        other => Err(AppError::InvalidArgument(format!(
            "unsupported photo type `{other}`"
        ))),
    }
}
