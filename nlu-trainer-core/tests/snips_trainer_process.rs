//! Runs the process-backed trainer against a shell script standing in for
//! `snips-nlu`, through the whole pipeline.
#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;

use nlu_trainer_core::contract::{MockBus, Trainer};
use nlu_trainer_core::error::Step;
use nlu_trainer_core::pipeline::TrainingPipeline;
use nlu_trainer_core::topics::Topics;
use nlu_trainer_core::trainer::SnipsTrainer;
use nlu_trainer_core::{JobError, JobOrchestrator, JobOutcome, OrchestratorSettings, Submission};

const FAKE_SNIPS: &str = r#"#!/bin/sh
case "$1" in
  download)
    if [ "$2" = "xx" ]; then
      echo "Unknown language: $2" >&2
      exit 3
    fi
    echo "Downloaded resources for $2"
    ;;
  train)
    if [ ! -f "$2" ]; then
      echo "dataset not found: $2" >&2
      exit 4
    fi
    mkdir -p "$3"
    cp "$2" "$3/dataset_copy.json"
    echo "engine" > "$3/nlu_engine.json"
    ;;
  *)
    echo "usage: snips-nlu download|train" >&2
    exit 64
    ;;
esac
"#;

// Run through `/bin/sh <script>` rather than executing the freshly written
// file, which can fail with ETXTBSY while other test threads fork.
fn fake_trainer(script_dir: &Path, working_dir: &Path) -> SnipsTrainer {
    let script = script_dir.join("snips-nlu.sh");
    std::fs::write(&script, FAKE_SNIPS).unwrap();
    SnipsTrainer::new("/bin/sh", working_dir).with_base_args([script])
}

#[tokio::test]
async fn captures_stdout_stderr_and_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = fake_trainer(dir.path(), dir.path());

    let ok = trainer.download("en").await.unwrap();
    assert!(ok.success());
    assert!(ok.stdout.contains("Downloaded resources for en"));

    let failed = trainer.download("xx").await.unwrap();
    assert_eq!(failed.code, Some(3));
    assert!(failed.stderr.contains("Unknown language: xx"));
}

#[tokio::test]
async fn train_failure_fails_the_pipeline_with_its_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = fake_trainer(dir.path(), dir.path());
    let missing = dir.path().join("missing.json");

    let failed = trainer.train(&missing, &dir.path().join("out")).await.unwrap();
    assert_eq!(failed.code, Some(4));

    let pipeline = TrainingPipeline::new(Arc::new(trainer));
    let err = pipeline
        .run(&missing, "en", &dir.path().join("out"))
        .await
        .unwrap_err();
    match err {
        JobError::Process { step, diagnostics } => {
            assert_eq!(step, Step::Train);
            assert!(diagnostics.contains("dataset not found"), "{diagnostics}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn arguments_are_not_interpreted_by_a_shell() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = fake_trainer(dir.path(), dir.path());
    let marker = dir.path().join("pwned");

    let language = format!("en; touch {}", marker.display());
    let output = trainer.download(&language).await.unwrap();
    assert!(output.success());
    assert!(!marker.exists(), "language must reach the trainer as a single argument");
}

#[tokio::test]
async fn missing_program_is_a_process_error() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = SnipsTrainer::new(dir.path().join("does-not-exist"), dir.path());
    let pipeline = TrainingPipeline::new(Arc::new(trainer));

    let err = pipeline
        .run(&dir.path().join("d.json"), "en", &dir.path().join("out"))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Process { step: Step::Download, .. }), "{err:?}");
}

#[tokio::test]
async fn full_job_against_fake_snips() {
    let bin = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let trainer = fake_trainer(bin.path(), work.path());

    let mut bus = MockBus::new();
    bus.expect_publish()
        .withf(|topic, _| topic == "projectalice/nlu/training")
        .times(1)
        .returning(|_, _| Ok(()));
    bus.expect_publish()
        .withf(|topic, payload| {
            topic.strip_prefix("projectalice/nlu/trainingResult/")
                == Some(nlu_trainer_core::package::content_hash(payload).as_str())
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let orchestrator = JobOrchestrator::new(
        Arc::new(trainer),
        Arc::new(bus),
        Topics::default(),
        OrchestratorSettings {
            work_dir: work.path().to_path_buf(),
            debug_dataset: None,
        },
    );

    let payload = br#"{"language":"en","data":{"entities":{"a":1},"intents":{"b":2}}}"#;
    let Submission::Accepted(handle) = orchestrator.handle_payload(payload).await else {
        panic!("job should be accepted");
    };
    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, JobOutcome::Published { .. }), "{outcome:?}");
}

#[tokio::test]
async fn unsupported_language_reports_trainer_stderr() {
    let bin = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let trainer = fake_trainer(bin.path(), work.path());

    let mut bus = MockBus::new();
    bus.expect_publish()
        .withf(|topic, _| topic == "projectalice/nlu/training")
        .returning(|_, _| Ok(()));
    bus.expect_publish()
        .withf(|topic, payload| {
            topic == "projectalice/nlu/trainingFailed"
                && String::from_utf8_lossy(payload).contains("Unknown language: xx")
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let orchestrator = JobOrchestrator::new(
        Arc::new(trainer),
        Arc::new(bus),
        Topics::default(),
        OrchestratorSettings {
            work_dir: work.path().to_path_buf(),
            debug_dataset: None,
        },
    );

    let payload = br#"{"language":"xx","data":{"entities":{"a":1},"intents":{}}}"#;
    let Submission::Accepted(handle) = orchestrator.handle_payload(payload).await else {
        panic!("job should be accepted");
    };
    assert!(matches!(handle.await.unwrap(), JobOutcome::Failed { .. }));
}
