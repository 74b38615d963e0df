//! Job orchestration: single-flight guard, background worker, status.
//!
//! [`JobOrchestrator`] is the only entry point the transport layer needs. It
//! decodes and validates submissions, enforces that at most one job trains at
//! a time, runs the pipeline on a tokio task, and guarantees that exactly one
//! of {result, failure} is published for every accepted job.
//!
//! # Pipeline
//! dataset staging → resource download → training → packaging → publication
//!
//! # Guard release
//! The [`TrainingSlot`] returned by [`JobState::try_begin`] is moved into the
//! worker task and releases the guard when dropped. That covers normal
//! completion, every error path, and a panicking stage.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::contract::{Bus, Trainer};
use crate::dataset::DatasetBuilder;
use crate::error::{JobError, JobResult};
use crate::job::{JobStatus, StatusReply, TrainingJob};
use crate::package::{ArtifactPackager, TrainingArtifact};
use crate::pipeline::TrainingPipeline;
use crate::publish::ResultPublisher;
use crate::topics::Topics;
use crate::workspace::JobWorkspace;

/// Process-wide single-flight guard: `false` is Idle, `true` is Training.
#[derive(Debug, Default)]
pub struct JobState {
    training: AtomicBool,
}

impl JobState {
    pub fn new() -> Arc<Self> {
        Arc::new(JobState::default())
    }

    /// Atomically move Idle → Training. `None` if a job is already running.
    pub fn try_begin(self: &Arc<Self>) -> Option<TrainingSlot> {
        self.training
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TrainingSlot {
                state: Arc::clone(self),
            })
    }

    pub fn status(&self) -> JobStatus {
        if self.training.load(Ordering::Acquire) {
            JobStatus::Training
        } else {
            JobStatus::Done
        }
    }
}

/// Ownership of the Training state. Dropping it moves the state back to Idle.
#[derive(Debug)]
pub struct TrainingSlot {
    state: Arc<JobState>,
}

impl Drop for TrainingSlot {
    fn drop(&mut self) {
        self.state.training.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Root under which per-job workspaces are created.
    pub work_dir: PathBuf,
    /// Training data used when a submission carries none.
    pub debug_dataset: Option<PathBuf>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        OrchestratorSettings {
            work_dir: std::env::temp_dir(),
            debug_dataset: None,
        }
    }
}

/// What a finished worker did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Published { content_hash: String },
    Failed { reason: String },
}

/// Result of handing a job to the orchestrator.
#[derive(Debug)]
pub enum Submission {
    /// A worker is running; the handle resolves after the guard was released.
    Accepted(JoinHandle<JobOutcome>),
    /// Nothing was started; the reason has already been published.
    Rejected(JobError),
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Submission::Accepted(_))
    }
}

pub struct JobOrchestrator<T: ?Sized, B: ?Sized> {
    inner: Arc<Inner<T, B>>,
}

struct Inner<T: ?Sized, B: ?Sized> {
    state: Arc<JobState>,
    builder: DatasetBuilder,
    pipeline: TrainingPipeline<T>,
    packager: ArtifactPackager,
    publisher: ResultPublisher<B>,
    settings: OrchestratorSettings,
}

impl<T: ?Sized, B: ?Sized> Clone for JobOrchestrator<T, B> {
    fn clone(&self) -> Self {
        JobOrchestrator {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, B> JobOrchestrator<T, B>
where
    T: Trainer + ?Sized + 'static,
    B: Bus + ?Sized + 'static,
{
    pub fn new(trainer: Arc<T>, bus: Arc<B>, topics: Topics, settings: OrchestratorSettings) -> Self {
        JobOrchestrator {
            inner: Arc::new(Inner {
                state: JobState::new(),
                builder: DatasetBuilder::new(),
                pipeline: TrainingPipeline::new(trainer),
                packager: ArtifactPackager::new(),
                publisher: ResultPublisher::new(bus, topics),
                settings,
            }),
        }
    }

    pub fn topics(&self) -> &Topics {
        self.inner.publisher.topics()
    }

    pub fn status(&self) -> JobStatus {
        self.inner.state.status()
    }

    /// Decode a raw `doTrain` payload and submit it.
    pub async fn handle_payload(&self, payload: &[u8]) -> Submission {
        info!(size = payload.len(), "Received training task");
        match TrainingJob::from_payload(payload, self.inner.settings.debug_dataset.as_deref()).await {
            Ok(job) => self.submit(job).await,
            Err(e) => self.reject(e).await,
        }
    }

    /// Start `job` on a background worker unless one is already running.
    ///
    /// Returns as soon as the worker is spawned. Rejections are published on
    /// the failure channel before this returns.
    pub async fn submit(&self, job: TrainingJob) -> Submission {
        if let Err(e) = job.validate() {
            return self.reject(e).await;
        }

        let Some(slot) = self.inner.state.try_begin() else {
            warn!(language = %job.language, "Rejecting job, another one is training");
            return self.reject(JobError::ConcurrencyRejected).await;
        };

        let job_id = Uuid::new_v4();
        let span = info_span!("training_job", %job_id, language = %job.language);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(
            async move {
                let _slot = slot;
                inner.run_worker(job, job_id).await
            }
            .instrument(span),
        );
        Submission::Accepted(handle)
    }

    pub async fn report_status(&self) -> JobResult<()> {
        let reply = StatusReply { status: self.status() };
        let payload = serde_json::to_vec(&reply)?;
        let topic = self.topics().status_reply();
        self.inner.publisher.send(&topic, payload).await
    }

    pub async fn announce_ready(&self) -> JobResult<()> {
        let topic = self.topics().ready();
        info!(topic = %topic, "Announcing trainer ready");
        self.inner.publisher.send(&topic, Vec::new()).await
    }

    pub async fn announce_offline(&self) -> JobResult<()> {
        let topic = self.topics().offline();
        info!(topic = %topic, "Announcing trainer stopped");
        self.inner.publisher.send(&topic, Vec::new()).await
    }

    async fn reject(&self, e: JobError) -> Submission {
        error!(error = %e, "Failed training NLU");
        self.inner.report_failure(&e.to_string()).await;
        Submission::Rejected(e)
    }
}

impl<T, B> Inner<T, B>
where
    T: Trainer + ?Sized + 'static,
    B: Bus + ?Sized + 'static,
{
    async fn run_worker(&self, job: TrainingJob, job_id: Uuid) -> JobOutcome {
        let started = Instant::now();

        let result = AssertUnwindSafe(self.run_pipeline(&job, job_id))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(JobError::Worker(format!(
                    "worker panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        let outcome = match result {
            Ok(artifact) => match self.publisher.publish_success(&artifact).await {
                Ok(()) => JobOutcome::Published {
                    content_hash: artifact.content_hash,
                },
                Err(e) => self.fail(e).await,
            },
            Err(e) => self.fail(e).await,
        };

        let elapsed = started.elapsed().as_secs_f64();
        match &outcome {
            JobOutcome::Published { content_hash } => {
                info!(elapsed_secs = elapsed, hash = %content_hash, "Training done")
            }
            JobOutcome::Failed { reason } => {
                warn!(elapsed_secs = elapsed, reason = %reason, "Training ended without artifact")
            }
        }
        outcome
    }

    async fn run_pipeline(&self, job: &TrainingJob, job_id: Uuid) -> JobResult<TrainingArtifact> {
        let workspace = JobWorkspace::create(&self.settings.work_dir, &job_id.to_string()).await?;

        let started_topic = self.publisher.topics().training_started();
        if let Err(e) = self.publisher.send(&started_topic, Vec::new()).await {
            warn!(error = %e, "Could not announce training start");
        }

        let dataset_path = workspace.dataset_path();
        self.builder.stage(job, &dataset_path).await?;

        let output = self
            .pipeline
            .run(&dataset_path, &job.language, &workspace.output_dir())
            .await?;

        self.packager.package(&output, &workspace.archive_path()).await
    }

    async fn fail(&self, e: JobError) -> JobOutcome {
        let reason = format!("Training failed: {e}");
        error!(error = ?e, "{reason}");
        self.report_failure(&reason).await;
        JobOutcome::Failed { reason }
    }

    async fn report_failure(&self, reason: &str) {
        if let Err(e) = self.publisher.publish_failure(reason).await {
            error!(error = %e, reason, "Failure reason could not be published");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
