use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use recap::pipeline::{StageError, StageInput, StageRunner, StageRunners};
use recap::task::{
    Alignment, AlignedWord, Diarization, ErrorKind, SpeakerSegment, Stage, StageArtifact, Summary,
    Transcript, TranscriptSegment,
};

#[allow(dead_code)]
pub fn run_recap(args: &[&str]) -> Output {
    TestEnv::new().run(args)
}

pub struct TestEnv {
    home: TempDir,
    config: TempDir,
    data: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            home: tempfile::tempdir().expect("create temporary HOME dir"),
            config: tempfile::tempdir().expect("create temporary XDG config dir"),
            data: tempfile::tempdir().expect("create temporary XDG data dir"),
        }
    }

    #[allow(dead_code)]
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_recap"))
            .args(args)
            .env("HOME", self.home.path())
            .env("XDG_CONFIG_HOME", self.config.path())
            .env("XDG_DATA_HOME", self.data.path())
            .env_remove("RECAP_LLM_ENDPOINT")
            .env_remove("RECAP_PROXY_BACKEND")
            .output()
            .expect("failed to execute recap binary")
    }

    #[allow(dead_code)]
    pub fn config_path(&self) -> PathBuf {
        let output = self.run(&["config", "path"]);
        assert!(
            output.status.success(),
            "config path should succeed\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );

        let path = String::from_utf8_lossy(&output.stdout);
        PathBuf::from(path.trim())
    }
}

/// Canonical artifact for a stage, usable as a prior output or an expected
/// result in pipeline tests.
#[allow(dead_code)]
pub fn artifact_for(stage: Stage) -> StageArtifact {
    match stage {
        Stage::Transcribe => StageArtifact::Transcript(Transcript {
            text: "hello world".to_string(),
            segments: vec![TranscriptSegment {
                start: 0.0,
                end: 2.0,
                text: "hello world".to_string(),
            }],
            language: Some("en".to_string()),
        }),
        Stage::Align => StageArtifact::Alignment(Alignment {
            words: vec![
                AlignedWord {
                    word: "hello".to_string(),
                    start: 0.0,
                    end: 1.0,
                },
                AlignedWord {
                    word: "world".to_string(),
                    start: 1.0,
                    end: 2.0,
                },
            ],
        }),
        Stage::Diarize => StageArtifact::Diarization(Diarization {
            segments: vec![SpeakerSegment {
                speaker: "SPEAKER_00".to_string(),
                start: 0.0,
                end: 2.0,
                text: "hello world".to_string(),
            }],
        }),
        Stage::Summarize => StageArtifact::Summary(Summary {
            text: "Summary: hello world".to_string(),
            model: "test-model".to_string(),
        }),
    }
}

/// Runner returning a fixed artifact, counting invocations.
pub struct ArtifactRunner {
    stage: Stage,
    calls: Arc<AtomicUsize>,
}

impl ArtifactRunner {
    #[allow(dead_code)]
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[allow(dead_code)]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl StageRunner for ArtifactRunner {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn run(&self, _input: &StageInput<'_>) -> Result<StageArtifact, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(artifact_for(self.stage))
    }
}

/// Runner failing with a fixed error kind for its first `fail_times` calls,
/// then succeeding. `usize::MAX` fails forever.
pub struct FailingRunner {
    stage: Stage,
    kind: ErrorKind,
    fail_times: usize,
    calls: Arc<AtomicUsize>,
}

impl FailingRunner {
    #[allow(dead_code)]
    pub fn new(stage: Stage, kind: ErrorKind, fail_times: usize) -> Self {
        Self {
            stage,
            kind,
            fail_times,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[allow(dead_code)]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl StageRunner for FailingRunner {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn run(&self, _input: &StageInput<'_>) -> Result<StageArtifact, StageError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_times {
            Err(StageError::new(self.kind, "injected failure"))
        } else {
            Ok(artifact_for(self.stage))
        }
    }
}

/// Runner that sleeps before producing, for cancellation and overlap tests.
pub struct SlowRunner {
    stage: Stage,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl SlowRunner {
    #[allow(dead_code)]
    pub fn new(stage: Stage, delay: Duration) -> Self {
        Self {
            stage,
            delay,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[allow(dead_code)]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl StageRunner for SlowRunner {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn run(&self, _input: &StageInput<'_>) -> Result<StageArtifact, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(artifact_for(self.stage))
    }
}

/// Full runner set that completes every stage immediately.
#[allow(dead_code)]
pub fn happy_runners() -> StageRunners {
    let mut runners = StageRunners::new();
    for stage in Stage::ALL {
        runners.insert(stage, Arc::new(ArtifactRunner::new(stage)) as Arc<dyn StageRunner>);
    }
    runners
}

/// Prior outputs for every stage before `until` (exclusive).
#[allow(dead_code)]
pub fn outputs_before(until: Stage) -> BTreeMap<Stage, StageArtifact> {
    Stage::ALL
        .into_iter()
        .take_while(|s| *s != until)
        .map(|s| (s, artifact_for(s)))
        .collect()
}
