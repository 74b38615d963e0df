//! Inbound job payloads and the status wire format.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dataset::take_section;
use crate::error::{JobError, JobResult};

pub type JsonMap = serde_json::Map<String, Value>;

/// A validated training request, consumed once by a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingJob {
    pub language: String,
    pub entities: JsonMap,
    pub intents: JsonMap,
}

/// Raw shape of a `doTrain` payload before validation.
#[derive(Debug, Default, Deserialize)]
struct WirePayload {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl TrainingJob {
    pub fn new(language: impl Into<String>, entities: JsonMap, intents: JsonMap) -> Self {
        TrainingJob {
            language: language.into(),
            entities,
            intents,
        }
    }

    /// Decode and validate a `doTrain` payload.
    ///
    /// `debug_dataset` is read only when the payload carries no training data.
    pub async fn from_payload(payload: &[u8], debug_dataset: Option<&Path>) -> JobResult<Self> {
        if payload.is_empty() {
            return Err(JobError::input("No payload in message"));
        }

        let wire: WirePayload = serde_json::from_slice(payload)
            .map_err(|e| JobError::input(format!("Invalid job payload: {e}")))?;

        let mut data = match wire.data {
            Some(Value::Object(map)) if !map.is_empty() => map,
            Some(Value::Object(_)) | Some(Value::Null) | None => load_debug_dataset(debug_dataset).await?,
            Some(other) => {
                warn!(kind = json_kind(&other), "Rejecting non-object training data");
                return Err(JobError::input("Training data must be a JSON object"));
            }
        };

        let language = wire
            .language
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .ok_or_else(|| JobError::input("Language not specified"))?;

        let entities = take_section(&mut data, "entities")?;
        let intents = take_section(&mut data, "intents")?;

        debug!(
            language = %language,
            entities = entities.len(),
            intents = intents.len(),
            "Decoded training job"
        );
        Ok(TrainingJob::new(language, entities, intents))
    }

    /// Checks that do not depend on the wire format: a language and at least
    /// one entity or intent to train on.
    pub fn validate(&self) -> JobResult<()> {
        if self.language.trim().is_empty() {
            return Err(JobError::input("Language not specified"));
        }
        if self.entities.is_empty() && self.intents.is_empty() {
            return Err(JobError::input("No training data received"));
        }
        Ok(())
    }
}

async fn load_debug_dataset(path: Option<&Path>) -> JobResult<JsonMap> {
    let Some(path) = path else {
        return Err(JobError::input("No training data received"));
    };
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(JobError::input("No training data received"));
    }
    info!(path = %path.display(), "Using debug data");
    let text = tokio::fs::read_to_string(path).await?;
    match serde_json::from_str::<Value>(&text)? {
        Value::Object(map) if !map.is_empty() => Ok(map),
        _ => Err(JobError::input("No training data received")),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Wire form of the single-flight guard state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Training,
    Done,
}

/// Payload of the status reply channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: JobStatus,
}
