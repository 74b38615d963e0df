/// `load_config` module: loads the optional YAML config file and merges it with
/// command line connection flags into the [`AgentConfig`] the binary runs with.
///
/// Every key in the file is optional; a missing file section falls back to the
/// built-in defaults (`snips-nlu` on `PATH`, the system temp
/// directory, the `projectalice` topic prefix).
///
/// # Errors
/// All errors use `anyhow::Error` with the offending path in the message and
/// are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use nlu_trainer_core::dispatch::DEFAULT_QUEUE_CAPACITY;
use nlu_trainer_core::orchestrator::OrchestratorSettings;
use nlu_trainer_core::topics::{Topics, DEFAULT_PREFIX};
use nlu_trainer_core::trainer::DEFAULT_PROGRAM;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub trainer: TrainerSection,
    pub work_dir: Option<PathBuf>,
    pub topic_prefix: Option<String>,
    pub queue_capacity: Option<usize>,
    pub client_id: Option<String>,
    pub debug_dataset: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TrainerSection {
    /// Trainer executable, `snips-nlu` when unset.
    pub program: Option<PathBuf>,
    /// Arguments placed before the subcommand.
    pub args: Vec<String>,
}

/// Broker connection parameters, straight from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub tls_file: Option<PathBuf>,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub connection: ConnectionSettings,
    pub client_id: String,
    pub trainer_program: PathBuf,
    pub trainer_args: Vec<String>,
    pub work_dir: PathBuf,
    pub topics: Topics,
    pub queue_capacity: usize,
    pub debug_dataset: Option<PathBuf>,
}

impl AgentConfig {
    pub fn resolve(connection: ConnectionSettings, file: FileConfig) -> Result<Self> {
        let queue_capacity = file.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
        if queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be at least 1");
        }

        let config = AgentConfig {
            connection,
            client_id: file.client_id.unwrap_or_else(default_client_id),
            trainer_program: file
                .trainer
                .program
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRAM)),
            trainer_args: file.trainer.args,
            work_dir: file.work_dir.unwrap_or_else(std::env::temp_dir),
            topics: Topics::new(file.topic_prefix.as_deref().unwrap_or(DEFAULT_PREFIX)),
            queue_capacity,
            debug_dataset: file.debug_dataset,
        };
        config.trace_loaded();
        Ok(config)
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            work_dir: self.work_dir.clone(),
            debug_dataset: self.debug_dataset.clone(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            host = %self.connection.host,
            port = self.connection.port,
            user = self.connection.user.as_deref().unwrap_or(""),
            tls = self.connection.tls_file.is_some(),
            client_id = %self.client_id,
            trainer = %self.trainer_program.display(),
            work_dir = %self.work_dir.display(),
            topic_prefix = self.topics.prefix(),
            "Loaded agent config"
        );
    }
}

fn default_client_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("nlu-trainer-{}", &id[..8])
}

/// Loads the YAML config file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref)
        .map_err(|e| {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            e
        })
        .with_context(|| format!("Failed to read config file {:?}", path_ref))?;

    // An empty file is a valid "all defaults" config.
    if content.trim().is_empty() {
        return Ok(FileConfig::default());
    }

    let parsed: FileConfig = serde_yaml::from_str(&content)
        .map_err(|e| {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            e
        })
        .with_context(|| format!("Failed to parse config YAML {:?}", path_ref))?;
    info!(config_path = ?path_ref, "Parsed config YAML successfully");
    Ok(parsed)
}
