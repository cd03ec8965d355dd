//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::RunnerError;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), RunnerError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), RunnerError> {
        if self.exists().await {
            fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }

    /// Check if a regular file with the given name exists directly in this directory
    pub async fn has_file(&self, name: &str) -> bool {
        fs::metadata(self.path.join(name))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Read a file within this directory as text, `None` if it is missing or unreadable
    pub async fn read_file(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.path.join(name)).await.ok()
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }
}
