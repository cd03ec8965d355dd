//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::RunnerError;
use crate::filesys::dir::Dir;

/// Local storage layout for the runner
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory holding per-job checkouts
    pub work_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// Get the work directory
    pub fn work_dir(&self) -> Dir {
        Dir::new(self.work_dir.clone())
    }

    /// Scratch directory for a single job, namespaced by job id
    pub fn job_dir(&self, job_id: u64) -> Dir {
        self.work_dir().subdir(&format!("job-{}", job_id))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), RunnerError> {
        self.work_dir().create().await
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("./deployments")
    }
}
