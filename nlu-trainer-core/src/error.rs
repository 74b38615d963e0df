use std::fmt;

use thiserror::Error;

pub type JobResult<T> = std::result::Result<T, JobError>;

/// Pipeline step that spawned an external trainer process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// `snips-nlu download <language>`
    Download,
    /// `snips-nlu train <dataset> <output>`
    Train,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Download => f.write_str("resource download"),
            Step::Train => f.write_str("training"),
        }
    }
}

/// Every way a training job can end without a published artifact.
///
/// The `Display` output of each variant is what ends up on the failure channel,
/// so messages are written for the person reading the bus, not for a developer.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Input(String),

    #[error("Already training, can't train now")]
    ConcurrencyRejected,

    #[error("{step} step failed: {diagnostics}")]
    Process { step: Step, diagnostics: String },

    #[error("packaging failed: {0}")]
    Packaging(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("worker fault: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl JobError {
    pub fn input(reason: impl Into<String>) -> Self {
        JobError::Input(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_error_embeds_step_and_diagnostics() {
        let err = JobError::Process {
            step: Step::Download,
            diagnostics: "no such language: xx".into(),
        };
        assert_eq!(
            err.to_string(),
            "resource download step failed: no such language: xx"
        );
    }

    #[test]
    fn rejection_mentions_already_training() {
        let msg = JobError::ConcurrencyRejected.to_string().to_lowercase();
        assert!(msg.contains("already training"), "got: {msg}");
    }
}
