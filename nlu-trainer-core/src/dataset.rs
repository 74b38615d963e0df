//! Dataset assembly and staging.
//!
//! A [`Dataset`] is the canonical document handed to the trainer. It is built
//! from a [`TrainingJob`] by shallow map union and written as UTF-8 JSON to the
//! job's staging file, replacing whatever was there.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Serializer, Value};
use tracing::{debug, info};

use crate::error::{JobError, JobResult};
use crate::job::{JsonMap, TrainingJob};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub entities: JsonMap,
    pub intents: JsonMap,
    pub language: String,
}

/// Shallow union of `sources`; on key collisions the later source wins.
pub fn merge<'a, I>(sources: I) -> JsonMap
where
    I: IntoIterator<Item = &'a JsonMap>,
{
    let mut merged = JsonMap::new();
    for source in sources {
        for (key, value) in source {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Remove a required object section (`entities`, `intents`) from raw training data.
pub(crate) fn take_section(data: &mut JsonMap, key: &str) -> JobResult<JsonMap> {
    match data.remove(key) {
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(JobError::input(format!("Training data `{key}` must be an object"))),
        None => Err(JobError::input(format!("Training data is missing `{key}`"))),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DatasetBuilder;

impl DatasetBuilder {
    pub fn new() -> Self {
        DatasetBuilder
    }

    /// Build the canonical dataset for `job`. Pure.
    pub fn build(&self, job: &TrainingJob) -> Dataset {
        Dataset {
            entities: merge([&job.entities]),
            intents: merge([&job.intents]),
            language: job.language.clone(),
        }
    }

    /// Write `dataset` to `path`, replacing any previous content.
    pub async fn commit(&self, dataset: &Dataset, path: &Path) -> JobResult<()> {
        let text = to_tab_indented_json(dataset)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, text.as_bytes()).await?;
        info!(
            path = %path.display(),
            bytes = text.len(),
            entities = dataset.entities.len(),
            intents = dataset.intents.len(),
            "Generated dataset for training"
        );
        Ok(())
    }

    /// Build and commit in one go; returns what was written.
    pub async fn stage(&self, job: &TrainingJob, path: &Path) -> JobResult<Dataset> {
        debug!(language = %job.language, "Preparing dataset");
        let dataset = self.build(job);
        self.commit(&dataset, path).await?;
        Ok(dataset)
    }
}

fn to_tab_indented_json(dataset: &Dataset) -> JobResult<String> {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"\t"));
    dataset.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| JobError::input(format!("dataset is not UTF-8: {e}")))
}
