//! Bounded hand-off between the transport's event loop and the orchestrator.
//!
//! The transport only classifies and enqueues; it never waits on job work. A
//! dedicated dispatcher task drains the queue, so status queries and presence
//! messages keep flowing while a job trains.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::contract::{Bus, Trainer};
use crate::orchestrator::JobOrchestrator;
use crate::topics::Topics;

pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// An inbound bus message the agent reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// The transport (re)connected to the broker.
    Connected,
    SubmitJob(Vec<u8>),
    StatusQuery,
    PeerReconnected,
}

impl Inbound {
    pub fn kind(&self) -> &'static str {
        match self {
            Inbound::Connected => "connected",
            Inbound::SubmitJob(_) => "submit_job",
            Inbound::StatusQuery => "status_query",
            Inbound::PeerReconnected => "peer_reconnected",
        }
    }

    /// Map a received publish to a message, `None` for topics we ignore.
    pub fn classify(topics: &Topics, topic: &str, payload: &[u8]) -> Option<Inbound> {
        if topic == topics.submit_job() {
            Some(Inbound::SubmitJob(payload.to_vec()))
        } else if topic == topics.status_query() {
            Some(Inbound::StatusQuery)
        } else if topic == topics.peer_reconnected() {
            Some(Inbound::PeerReconnected)
        } else {
            None
        }
    }
}

/// Producer side of the inbound queue, held by the transport.
#[derive(Debug, Clone)]
pub struct InboundSender {
    tx: mpsc::Sender<Inbound>,
}

impl InboundSender {
    /// Enqueue without waiting. Returns `false` if the message was dropped.
    pub fn offer(&self, message: Inbound) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!(kind = message.kind(), "Inbound queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Inbound queue closed, dispatcher is gone");
                false
            }
        }
    }
}

pub fn inbound_queue(capacity: usize) -> (InboundSender, mpsc::Receiver<Inbound>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (InboundSender { tx }, rx)
}

/// Drain `rx` until every sender is dropped.
pub async fn run_dispatcher<T, B>(orchestrator: JobOrchestrator<T, B>, mut rx: mpsc::Receiver<Inbound>)
where
    T: Trainer + ?Sized + 'static,
    B: Bus + ?Sized + 'static,
{
    info!("Dispatcher started");
    while let Some(message) = rx.recv().await {
        match message {
            Inbound::SubmitJob(payload) => {
                // The worker is detached; its outcome is published, not awaited.
                let submission = orchestrator.handle_payload(&payload).await;
                debug!(accepted = submission.is_accepted(), "Submission handled");
            }
            Inbound::StatusQuery => {
                if let Err(e) = orchestrator.report_status().await {
                    error!(error = %e, "Could not send status reply");
                }
            }
            Inbound::Connected => {
                info!("Bus connected, listening for training tasks");
                if let Err(e) = orchestrator.announce_ready().await {
                    error!(error = %e, "Could not announce readiness");
                }
            }
            Inbound::PeerReconnected => {
                info!("Alice main unit just connected");
                if let Err(e) = orchestrator.announce_ready().await {
                    error!(error = %e, "Could not announce readiness");
                }
            }
        }
    }
    info!("Inbound queue closed, dispatcher stopping");
}
