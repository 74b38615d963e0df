//! MQTT transport: implements the core's [`Bus`] trait on top of `rumqttc` and
//! drives the event loop that feeds the inbound queue.
//!
//! The event loop task never waits on job work. Inbound publishes are
//! classified by topic and offered to the bounded queue; anything the
//! dispatcher cannot take right away is dropped with a warning.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use nlu_trainer_core::contract::{Bus, BusError};
use nlu_trainer_core::dispatch::{Inbound, InboundSender};
use nlu_trainer_core::topics::Topics;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use tracing::{debug, error, info, warn};

use crate::load_config::ConnectionSettings;

/// Largest packet MQTT 3.1.1 can carry; trained engines are several megabytes.
const MAX_PACKET_SIZE: usize = 268_435_455;
const REQUEST_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
}

impl MqttBus {
    pub fn client(&self) -> &AsyncClient {
        &self.client
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .context("Failed to send MQTT disconnect")
    }
}

#[async_trait]
impl Bus for MqttBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        debug!(topic, size = payload.len(), "Publishing");
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| -> BusError { format!("MQTT publish to {topic} failed: {e}").into() })
    }
}

pub fn mqtt_options(settings: &ConnectionSettings, client_id: &str) -> Result<MqttOptions> {
    let mut options = MqttOptions::new(client_id, settings.host.clone(), settings.port);
    options.set_keep_alive(Duration::from_secs(30));
    options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

    if let Some(user) = settings.user.as_deref().filter(|u| !u.is_empty()) {
        options.set_credentials(user, settings.password.clone().unwrap_or_default());
    }

    if let Some(tls_file) = settings.tls_file.as_deref() {
        if tls_file.exists() {
            options.set_transport(tls_transport(tls_file)?);
            info!(tls_file = %tls_file.display(), "TLS enabled");
        } else {
            warn!(tls_file = %tls_file.display(), "TLS certificate not found, connecting without TLS");
        }
    }

    Ok(options)
}

fn tls_transport(ca_file: &Path) -> Result<Transport> {
    let ca = std::fs::read(ca_file)
        .with_context(|| format!("Failed to read TLS certificate {}", ca_file.display()))?;
    Ok(Transport::tls(ca, None, None))
}

/// Connect and wait for the broker's CONNACK. Any error before that is fatal.
pub async fn connect(
    settings: &ConnectionSettings,
    client_id: &str,
    topics: &Topics,
) -> Result<(MqttBus, EventLoop)> {
    info!(host = %settings.host, port = settings.port, "Connecting to broker");
    let options = mqtt_options(settings, client_id)?;
    let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(code = ?ack.code, "Mqtt connected, listening for training tasks");
                break;
            }
            Ok(event) => debug!(?event, "Event before CONNACK"),
            Err(e) => {
                error!(error = %e, "Error connecting");
                return Err(anyhow::Error::new(e)).with_context(|| {
                    format!("Failed to connect to {}:{}", settings.host, settings.port)
                });
            }
        }
    }

    subscribe_all(&client, topics)?;
    Ok((MqttBus { client }, eventloop))
}

fn subscribe_all(client: &AsyncClient, topics: &Topics) -> Result<()> {
    for topic in topics.inbound() {
        client
            .try_subscribe(topic.as_str(), QoS::AtMostOnce)
            .with_context(|| format!("Failed to subscribe to {topic}"))?;
        debug!(topic = %topic, "Subscribed");
    }
    Ok(())
}

/// Poll the event loop until the client disconnects.
///
/// Reconnects are handled by `rumqttc` on the next poll; after each new
/// CONNACK the subscriptions are renewed and readiness is announced again.
pub async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: Topics,
    inbound: InboundSender,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                match Inbound::classify(&topics, &publish.topic, &publish.payload) {
                    Some(message) => {
                        inbound.offer(message);
                    }
                    None => debug!(topic = %publish.topic, "Ignoring message on unexpected topic"),
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Reconnected to broker");
                if let Err(e) = subscribe_all(&client, &topics) {
                    error!(error = %e, "Could not renew subscriptions");
                }
                inbound.offer(Inbound::Connected);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("Disconnect sent, stopping event loop");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Connection to broker lost, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
