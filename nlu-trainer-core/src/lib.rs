#![doc = "nlu-trainer-core: job orchestration and pipeline engine for the offshore NLU trainer."]

//! This crate holds every piece of job semantics: payload validation, the
//! single-flight guard, dataset staging, the external trainer pipeline,
//! artifact packaging and result publication.
//!
//! It has no transport dependency. The message bus and the trainer process are
//! reached through the [`contract::Bus`] and [`contract::Trainer`] traits; the
//! binary crate wires in MQTT, and [`trainer::SnipsTrainer`] spawns the real
//! tool.
//!
//! # Usage
//! Build a [`orchestrator::JobOrchestrator`], feed it through
//! [`dispatch::run_dispatcher`], and push inbound messages with
//! [`dispatch::InboundSender::offer`].

pub mod contract;
pub mod dataset;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod package;
pub mod pipeline;
pub mod publish;
pub mod topics;
pub mod trainer;
pub mod workspace;

pub use error::{JobError, JobResult};
pub use orchestrator::{JobOrchestrator, JobOutcome, OrchestratorSettings, Submission};
