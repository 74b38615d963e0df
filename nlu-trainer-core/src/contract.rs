//! # contract: the capabilities the job engine consumes
//!
//! The engine never talks to a broker or spawns a process directly. It goes
//! through the two traits defined here:
//!
//! - [`Bus`]: fire-and-forget publishing of a payload on a topic.
//! - [`Trainer`]: the external NLU trainer, one method per pipeline step.
//!
//! Both are annotated for `mockall` so tests (in this crate and downstream,
//! via the `test-export-mocks` feature) can generate deterministic doubles.
//!
//! Implementations live elsewhere: the MQTT adapter in the binary crate, and
//! [`crate::trainer::SnipsTrainer`] for the real trainer.

use std::path::Path;
use std::process::ExitStatus;

use async_trait::async_trait;
use mockall::automock;

/// Error type for bus operations (boxed, transport-specific).
pub type BusError = Box<dyn std::error::Error + Send + Sync>;

/// Trait for publishing messages on the message bus.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish `payload` on `topic`. Returns once the transport accepted the
    /// message; delivery guarantees are the transport's business.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;
}

/// Captured result of one external trainer invocation.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl StepOutput {
    pub fn from_output(output: &std::process::Output) -> Self {
        Self::from_parts(output.status, &output.stdout, &output.stderr)
    }

    pub fn from_parts(status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> Self {
        StepOutput {
            code: status.code(),
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            stderr: String::from_utf8_lossy(stderr).into_owned(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Best diagnostic text for a failure report: stderr, else stdout, else
    /// the exit code.
    pub fn diagnostics(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("process exited with code {code}"),
            None => "process terminated by signal".to_string(),
        }
    }
}

/// The external NLU trainer, treated as a black box.
///
/// Implementations only run the process and capture its output. Judging
/// success (exit code, output directory contents) is the pipeline's job.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Trainer: Send + Sync {
    /// Fetch the language resources needed to train for `language`.
    async fn download(&self, language: &str) -> std::io::Result<StepOutput>;

    /// Train on the dataset at `dataset`, writing the engine to `output`.
    async fn train(&self, dataset: &Path, output: &Path) -> std::io::Result<StepOutput>;
}
