//! Result publication: content-addressed success, plain-text failure.

use std::sync::Arc;

use tracing::{error, info};

use crate::contract::Bus;
use crate::error::{JobError, JobResult};
use crate::package::TrainingArtifact;
use crate::topics::Topics;

pub struct ResultPublisher<B: ?Sized> {
    bus: Arc<B>,
    topics: Topics,
}

impl<B: ?Sized> Clone for ResultPublisher<B> {
    fn clone(&self) -> Self {
        ResultPublisher {
            bus: Arc::clone(&self.bus),
            topics: self.topics.clone(),
        }
    }
}

impl<B> ResultPublisher<B>
where
    B: Bus + ?Sized,
{
    pub fn new(bus: Arc<B>, topics: Topics) -> Self {
        ResultPublisher { bus, topics }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Send the archive on the result topic addressed by its content hash.
    ///
    /// Receivers verify integrity by hashing the payload and comparing it to
    /// the last topic segment.
    pub async fn publish_success(&self, artifact: &TrainingArtifact) -> JobResult<()> {
        let topic = self.topics.result(&artifact.content_hash);
        info!(topic = %topic, size = artifact.bytes.len(), "Sending results");
        self.send(&topic, artifact.bytes.clone()).await
    }

    /// Send a human-readable failure reason.
    pub async fn publish_failure(&self, reason: &str) -> JobResult<()> {
        let topic = self.topics.failure();
        info!(topic = %topic, reason, "Reporting failed training");
        self.send(&topic, reason.as_bytes().to_vec()).await
    }

    /// Publish an arbitrary message (presence, status, notifications).
    pub async fn send(&self, topic: &str, payload: Vec<u8>) -> JobResult<()> {
        self.bus.publish(topic, payload).await.map_err(|e| {
            error!(topic, error = %e, "Bus publish failed");
            JobError::Publish(format!("{topic}: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockBus;
    use crate::package::content_hash;

    #[tokio::test]
    async fn success_topic_is_the_hash_of_the_payload() {
        let artifact = TrainingArtifact::from_bytes(b"archive bytes".to_vec());
        let expected_topic = format!("projectalice/nlu/trainingResult/{}", content_hash(b"archive bytes"));

        let mut bus = MockBus::new();
        bus.expect_publish()
            .withf(move |topic, payload| topic == expected_topic && payload == b"archive bytes")
            .times(1)
            .returning(|_, _| Ok(()));

        let publisher = ResultPublisher::new(Arc::new(bus), Topics::default());
        publisher.publish_success(&artifact).await.unwrap();
    }

    #[tokio::test]
    async fn failure_goes_to_failure_topic_as_utf8() {
        let mut bus = MockBus::new();
        bus.expect_publish()
            .withf(|topic, payload| {
                topic == "projectalice/nlu/trainingFailed" && payload == "Training failed: ü".as_bytes()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let publisher = ResultPublisher::new(Arc::new(bus), Topics::default());
        publisher.publish_failure("Training failed: ü").await.unwrap();
    }

    #[tokio::test]
    async fn bus_errors_surface_as_publish_errors() {
        let mut bus = MockBus::new();
        bus.expect_publish()
            .times(1)
            .returning(|_, _| Err("broker unreachable".into()));

        let publisher = ResultPublisher::new(Arc::new(bus), Topics::default());
        let err = publisher.publish_failure("x").await.unwrap_err();
        assert!(matches!(err, JobError::Publish(ref m) if m.contains("broker unreachable")));
    }
}
