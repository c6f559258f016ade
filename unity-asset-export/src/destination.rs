//! Directory export destination

use crate::rename::relative_export_path;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use unity_asset_export_core::{ErrorContext, ExportDestination, ExportError, Result};

/// Writes export items below a root directory, never overwriting files
#[derive(Debug, Clone)]
pub struct DirectoryDestination {
    root: PathBuf,
}

impl DirectoryDestination {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a `/`-separated relative path below the root
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        Ok(self.root.join(relative_export_path(path)?))
    }
}

#[async_trait]
impl ExportDestination for DirectoryDestination {
    async fn write_new(&self, path: &str, data: Bytes) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(format!("creating {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => ExportError::write_conflict(path),
                _ => ExportError::from(e),
            })?;
        file.write_all(&data)
            .await
            .with_context(format!("writing {}", path))?;
        file.flush().await?;
        Ok(())
    }
}
