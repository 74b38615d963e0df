///
/// This module implements the CLI interface for nlu-trainer: command parsing,
/// argument validation, and the `serve` entrypoint that wires the MQTT
/// transport to the job engine.
///
/// All job semantics live in the [`nlu-trainer-core`] crate. This module is
/// strictly glue: configuration, connection, task startup and shutdown.
///
/// ## How To Use
/// - For command-line users: use the installed `nlu-trainer` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`nlu-trainer-core`]: ../../nlu-trainer-core/
use crate::bus::{connect, run_event_loop, MqttBus};
use crate::load_config::{load_config, AgentConfig, ConnectionSettings, FileConfig};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use nlu_trainer_core::dispatch::{inbound_queue, run_dispatcher, Inbound};
use nlu_trainer_core::topics::WIRE_CONTRACT;
use nlu_trainer_core::trainer::SnipsTrainer;
use nlu_trainer_core::JobOrchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// CLI for nlu-trainer: train NLU engines on request from the message bus.
#[derive(Parser)]
#[clap(
    name = "nlu-trainer",
    version,
    about = "Listen on MQTT for NLU training jobs, train them with snips-nlu and publish the result"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the broker and serve training jobs until interrupted
    Serve(ServeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Mqtt server hostname
    #[clap(long, env = "NLU_TRAINER_HOST", default_value = "localhost")]
    pub host: String,

    /// Mqtt server port
    #[clap(short, long, env = "NLU_TRAINER_PORT", default_value_t = 1883)]
    pub port: u16,

    /// Mqtt server username if required
    #[clap(short, long, env = "NLU_TRAINER_USER")]
    pub user: Option<String>,

    /// Mqtt server password if required
    #[clap(short = 's', long, env = "NLU_TRAINER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path to TLS certificate file, if required
    #[clap(short = 't', long = "tls-file", env = "NLU_TRAINER_TLS_FILE")]
    pub tls_file: Option<PathBuf>,

    /// Optional YAML config file (trainer program, work dir, topic prefix, ...)
    #[clap(short, long, env = "NLU_TRAINER_CONFIG")]
    pub config: Option<PathBuf>,
}

impl ServeArgs {
    pub fn connection(&self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            tls_file: self.tls_file.clone(),
        }
    }

    pub fn resolve(&self) -> Result<AgentConfig> {
        let file = match &self.config {
            Some(path) => load_config(path)?,
            None => FileConfig::default(),
        };
        AgentConfig::resolve(self.connection(), file)
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Serve(args) => {
            let config = args.resolve()?;
            serve(config, shutdown_signal()).await
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for Ctrl-C, shutting down");
    }
}

/// Run the agent until `shutdown` resolves, then announce offline and disconnect.
pub async fn serve<F>(config: AgentConfig, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()>,
{
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        wire_contract = WIRE_CONTRACT,
        topic_prefix = config.topics.prefix(),
        "Starting Project Alice offshore NLU trainer"
    );

    let (bus, eventloop) = connect(&config.connection, &config.client_id, &config.topics).await?;
    let bus = Arc::new(bus);

    let trainer = SnipsTrainer::new(&config.trainer_program, &config.work_dir)
        .with_base_args(config.trainer_args.iter());
    tracing::info!(program = %trainer.program().display(), "Using trainer");
    let orchestrator = JobOrchestrator::new(
        Arc::new(trainer),
        Arc::clone(&bus),
        config.topics.clone(),
        config.orchestrator_settings(),
    );

    let (inbound, rx) = inbound_queue(config.queue_capacity);
    let dispatcher = tokio::spawn(run_dispatcher(orchestrator.clone(), rx));
    inbound.offer(Inbound::Connected);

    let event_loop = tokio::spawn(run_event_loop(
        eventloop,
        bus.client().clone(),
        config.topics.clone(),
        inbound,
    ));

    shutdown.await;
    tracing::info!("Stopping");
    stop(&orchestrator, &bus).await;

    let event_loop_abort = event_loop.abort_handle();
    if tokio::time::timeout(SHUTDOWN_GRACE, event_loop).await.is_err() {
        tracing::warn!("Event loop did not stop in time");
        event_loop_abort.abort();
    }
    // The event loop owned the last sender; the dispatcher drains and exits.
    if tokio::time::timeout(SHUTDOWN_GRACE, dispatcher).await.is_err() {
        tracing::warn!("Dispatcher did not stop in time");
    }
    Ok(())
}

async fn stop(orchestrator: &JobOrchestrator<SnipsTrainer, MqttBus>, bus: &MqttBus) {
    if let Err(e) = orchestrator.announce_offline().await {
        tracing::error!(error = %e, "Could not announce offline");
    }
    if let Err(e) = bus.disconnect().await {
        tracing::error!(error = %e, "Could not disconnect cleanly");
    }
}
