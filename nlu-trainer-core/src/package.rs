//! Packaging of a trained engine into a single content-addressed archive.

use std::fs::File;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{JobError, JobResult};

/// The packaged result of one successful job.
#[derive(Clone, PartialEq, Eq)]
pub struct TrainingArtifact {
    pub bytes: Vec<u8>,
    /// Lowercase hex SHA-256 of `bytes`.
    pub content_hash: String,
}

impl std::fmt::Debug for TrainingArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingArtifact")
            .field("len", &self.bytes.len())
            .field("content_hash", &self.content_hash)
            .finish()
    }
}

impl TrainingArtifact {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let content_hash = content_hash(&bytes);
        TrainingArtifact { bytes, content_hash }
    }
}

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ArtifactPackager;

impl ArtifactPackager {
    pub fn new() -> Self {
        ArtifactPackager
    }

    /// Compress `output_dir` into a gzip'd tar at `archive_path` and hash it.
    ///
    /// Any archive already at `archive_path` is removed first.
    pub async fn package(&self, output_dir: &Path, archive_path: &Path) -> JobResult<TrainingArtifact> {
        let output_dir = output_dir.to_path_buf();
        let archive_path = archive_path.to_path_buf();
        tokio::task::spawn_blocking(move || package_blocking(&output_dir, &archive_path))
            .await
            .map_err(|e| JobError::Packaging(format!("packaging task failed: {e}")))?
    }
}

fn package_blocking(output_dir: &Path, archive_path: &Path) -> JobResult<TrainingArtifact> {
    if archive_path.exists() {
        std::fs::remove_file(archive_path).map_err(|e| packaging("remove stale archive", archive_path, e))?;
        debug!(path = %archive_path.display(), "Removed stale archive");
    }

    write_archive(output_dir, archive_path).map_err(|e| packaging("create archive", archive_path, e))?;

    let bytes = std::fs::read(archive_path).map_err(|e| packaging("read archive", archive_path, e))?;
    if bytes.is_empty() {
        return Err(JobError::Packaging(format!(
            "archive {} is empty",
            archive_path.display()
        )));
    }

    let artifact = TrainingArtifact::from_bytes(bytes);
    info!(
        archive = %archive_path.display(),
        size = artifact.bytes.len(),
        hash = %artifact.content_hash,
        "Packaged trained engine"
    );
    Ok(artifact)
}

fn write_archive(source: &Path, archive_path: &Path) -> std::io::Result<()> {
    let file = File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut tar = tar::Builder::new(encoder);
    tar.mode(tar::HeaderMode::Deterministic);
    tar.append_dir_all(".", source)?;
    let encoder = tar.into_inner()?;
    encoder.finish()?.sync_all()?;
    Ok(())
}

fn packaging(action: &str, path: &Path, e: std::io::Error) -> JobError {
    JobError::Packaging(format!("{action} {}: {e}", path.display()))
}
