//! Per-job scratch directory.
//!
//! Every job gets its own temporary directory under the configured work root.
//! The directory and everything in it is removed when the [`JobWorkspace`] is
//! dropped, which happens when the worker finishes, fails or panics.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

pub const DATASET_FILE: &str = "dataset.json";
pub const OUTPUT_DIR: &str = "trained";
pub const ARCHIVE_FILE: &str = "trained.tar.gz";

#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    /// Create a fresh workspace under `root`, creating `root` if needed.
    pub async fn create(root: &Path, job_id: &str) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(root).await?;
        let root = root.to_path_buf();
        let prefix = format!("nlu-job-{job_id}-");
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempdir_in(&root)
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
        debug!(path = %dir.path().display(), "Created job workspace");
        Ok(JobWorkspace { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.dir.path().join(DATASET_FILE)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join(OUTPUT_DIR)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.dir.path().join(ARCHIVE_FILE)
    }
}
