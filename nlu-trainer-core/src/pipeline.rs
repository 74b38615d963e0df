//! Two-step external training pipeline: resource download, then training.
//!
//! Fail-fast: the first failing step aborts the run and later steps never
//! start. A step fails when the process cannot be spawned, exits non-zero, or
//! (for training) leaves no output behind. The failure carries the process's
//! captured diagnostics so the reason published on the bus is actionable.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use crate::contract::{StepOutput, Trainer};
use crate::error::{JobError, JobResult, Step};

pub struct TrainingPipeline<T: ?Sized> {
    trainer: Arc<T>,
}

impl<T: ?Sized> Clone for TrainingPipeline<T> {
    fn clone(&self) -> Self {
        TrainingPipeline {
            trainer: Arc::clone(&self.trainer),
        }
    }
}

impl<T> TrainingPipeline<T>
where
    T: Trainer + ?Sized,
{
    pub fn new(trainer: Arc<T>) -> Self {
        TrainingPipeline { trainer }
    }

    /// Run both steps and return the populated output directory.
    pub async fn run(&self, dataset: &Path, language: &str, output: &Path) -> JobResult<PathBuf> {
        self.prepare_resources(language).await?;
        clear_output(output).await?;
        self.train(dataset, output).await?;
        Ok(output.to_path_buf())
    }

    async fn prepare_resources(&self, language: &str) -> JobResult<()> {
        info!(language, "Download language support");
        let started = Instant::now();
        let outcome = self.trainer.download(language).await;
        let output = check_step(Step::Download, outcome)?;
        info!(
            language,
            elapsed_ms = started.elapsed().as_millis() as u64,
            code = ?output.code,
            "Language resources ready"
        );
        Ok(())
    }

    async fn train(&self, dataset: &Path, output: &Path) -> JobResult<()> {
        info!(dataset = %dataset.display(), output = %output.display(), "Begin training");
        let started = Instant::now();
        let outcome = self.trainer.train(dataset, output).await;
        let step_output = check_step(Step::Train, outcome)?;

        if !dir_has_entries(output).await {
            error!(output = %output.display(), "Trainer exited cleanly but produced no output");
            let detail = step_output.diagnostics();
            return Err(JobError::Process {
                step: Step::Train,
                diagnostics: format!(
                    "no trained engine found at {} ({detail})",
                    output.display()
                ),
            });
        }

        info!(
            output = %output.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Training step completed"
        );
        Ok(())
    }
}

fn check_step(step: Step, outcome: std::io::Result<StepOutput>) -> JobResult<StepOutput> {
    match outcome {
        Ok(output) if output.success() => Ok(output),
        Ok(output) => {
            error!(%step, code = ?output.code, stderr = %output.stderr, "Trainer step exited with failure");
            Err(JobError::Process {
                step,
                diagnostics: output.diagnostics(),
            })
        }
        Err(e) => {
            error!(%step, error = ?e, "Failed to launch trainer process");
            Err(JobError::Process {
                step,
                diagnostics: format!("could not start trainer: {e}"),
            })
        }
    }
}

/// Remove leftovers from an earlier run so results never mix across jobs.
async fn clear_output(output: &Path) -> JobResult<()> {
    if tokio::fs::try_exists(output).await? {
        tokio::fs::remove_dir_all(output).await?;
        info!(path = %output.display(), "Removed previous output directory");
    }
    Ok(())
}

async fn dir_has_entries(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}
