//! Process-backed [`Trainer`] for the `snips-nlu` command line tool.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::contract::{StepOutput, Trainer};

pub const DEFAULT_PROGRAM: &str = "snips-nlu";

/// Spawns the trainer executable with an explicit argument list (never a
/// shell), a fixed working directory, and captured stdout/stderr.
#[derive(Debug, Clone)]
pub struct SnipsTrainer {
    program: PathBuf,
    base_args: Vec<OsString>,
    working_dir: PathBuf,
}

impl SnipsTrainer {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        SnipsTrainer {
            program: program.into(),
            base_args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    /// Arguments placed before the subcommand, e.g. `["-m", "snips_nlu"]`
    /// when the program is a Python interpreter.
    pub fn with_base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn invoke<I, S>(&self, args: I) -> std::io::Result<StepOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        debug!(command = ?command.as_std(), "Spawning trainer");

        let output = command.output().await?;
        let step = StepOutput::from_output(&output);
        debug!(code = ?step.code, stdout = %step.stdout, stderr = %step.stderr, "Trainer exited");
        Ok(step)
    }
}

#[async_trait]
impl Trainer for SnipsTrainer {
    async fn download(&self, language: &str) -> std::io::Result<StepOutput> {
        self.invoke([OsStr::new("download"), OsStr::new(language)]).await
    }

    async fn train(&self, dataset: &Path, output: &Path) -> std::io::Result<StepOutput> {
        self.invoke([OsStr::new("train"), dataset.as_os_str(), output.as_os_str()])
            .await
    }
}
