//! Topic names of the `v1` wire contract.

/// Version tag of the topic layout and payload shapes below.
pub const WIRE_CONTRACT: &str = "v1";

pub const DEFAULT_PREFIX: &str = "projectalice";

/// Every topic the agent subscribes to or publishes on, derived from one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Default for Topics {
    fn default() -> Self {
        Topics::new(DEFAULT_PREFIX)
    }
}

impl Topics {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Topics {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn submit_job(&self) -> String {
        format!("{}/nlu/doTrain", self.prefix)
    }

    pub fn ready(&self) -> String {
        format!("{}/nlu/trainerReady", self.prefix)
    }

    pub fn offline(&self) -> String {
        format!("{}/nlu/trainerStopped", self.prefix)
    }

    pub fn training_started(&self) -> String {
        format!("{}/nlu/training", self.prefix)
    }

    pub fn peer_reconnected(&self) -> String {
        format!("{}/devices/coreReconnection", self.prefix)
    }

    pub fn status_query(&self) -> String {
        format!("{}/nlu/trainingStatus/query", self.prefix)
    }

    pub fn status_reply(&self) -> String {
        format!("{}/nlu/trainingStatus", self.prefix)
    }

    pub fn failure(&self) -> String {
        format!("{}/nlu/trainingFailed", self.prefix)
    }

    /// Content-addressed result topic for an archive with the given hash.
    pub fn result(&self, content_hash: &str) -> String {
        format!("{}/nlu/trainingResult/{}", self.prefix, content_hash)
    }

    /// Topics the agent has to subscribe to.
    pub fn inbound(&self) -> [String; 3] {
        [self.submit_job(), self.status_query(), self.peer_reconnected()]
    }
}
