//! Shared fixtures for scheduler integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::watch;

use mcomp_media::{MediaError, MediaResult, TranscodeProcess, TranscodeRequest, Transcoder};
use mcomp_models::{InputDescriptor, MediaKind};
use mcomp_worker::WorkerConfig;

/// Bytes written as the output of a successful fake run.
pub const FAKE_OUTPUT: &[u8] = b"compressed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Runs until the test calls `finish`
    Manual,
    /// Succeeds as soon as it starts
    Immediate,
    /// Panics while starting
    Panicking,
}

struct FakeInner {
    mode: Mode,
    honors_terminate: bool,
    runs: Mutex<HashMap<PathBuf, watch::Sender<Option<bool>>>>,
    started: Mutex<Vec<PathBuf>>,
    terminations: AtomicUsize,
    kills: AtomicUsize,
}

/// Transcoder whose runs are driven by the test.
#[derive(Clone)]
pub struct FakeTranscoder {
    inner: Arc<FakeInner>,
}

impl FakeTranscoder {
    fn with_mode(mode: Mode, honors_terminate: bool) -> Self {
        Self {
            inner: Arc::new(FakeInner {
                mode,
                honors_terminate,
                runs: Mutex::new(HashMap::new()),
                started: Mutex::new(Vec::new()),
                terminations: AtomicUsize::new(0),
                kills: AtomicUsize::new(0),
            }),
        }
    }

    pub fn manual() -> Self {
        Self::with_mode(Mode::Manual, true)
    }

    /// Manual runs that ignore termination requests.
    pub fn stubborn() -> Self {
        Self::with_mode(Mode::Manual, false)
    }

    pub fn immediate() -> Self {
        Self::with_mode(Mode::Immediate, true)
    }

    pub fn panicking() -> Self {
        Self::with_mode(Mode::Panicking, true)
    }

    pub fn shared(&self) -> Arc<dyn Transcoder> {
        Arc::new(self.clone())
    }

    /// Let the run for `input` exit. Returns false if it never started.
    pub fn finish(&self, input: &Path, success: bool) -> bool {
        let runs = self.inner.runs.lock().unwrap();
        match runs.get(input) {
            Some(tx) => {
                tx.send_replace(Some(success));
                true
            }
            None => false,
        }
    }

    /// Inputs in the order their runs started.
    pub fn started(&self) -> Vec<PathBuf> {
        self.inner.started.lock().unwrap().clone()
    }

    pub fn terminations(&self) -> usize {
        self.inner.terminations.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> usize {
        self.inner.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn start(&self, request: &TranscodeRequest) -> MediaResult<Box<dyn TranscodeProcess>> {
        if self.inner.mode == Mode::Panicking {
            panic!("fake transcoder crashed");
        }

        let initial = (self.inner.mode == Mode::Immediate).then_some(true);
        let (tx, rx) = watch::channel(initial);
        self.inner
            .runs
            .lock()
            .unwrap()
            .insert(request.input.clone(), tx);
        self.inner
            .started
            .lock()
            .unwrap()
            .push(request.input.clone());

        Ok(Box::new(FakeProcess {
            output: request.output.clone(),
            result: rx,
            terminated: false,
            fake: self.inner.clone(),
        }))
    }
}

struct FakeProcess {
    output: PathBuf,
    result: watch::Receiver<Option<bool>>,
    terminated: bool,
    fake: Arc<FakeInner>,
}

#[async_trait]
impl TranscodeProcess for FakeProcess {
    async fn wait(&mut self) -> MediaResult<()> {
        if self.terminated {
            return Err(MediaError::Terminated);
        }
        let outcome = self
            .result
            .wait_for(|result| result.is_some())
            .await
            .map(|result| *result);

        match outcome {
            Ok(Some(true)) => {
                tokio::fs::write(&self.output, FAKE_OUTPUT).await?;
                Ok(())
            }
            Ok(_) => Err(MediaError::process_failed(
                "fake",
                "exited with status 1",
                Some("invalid data found when processing input".to_string()),
                Some(1),
            )),
            Err(_) => Err(MediaError::Terminated),
        }
    }

    fn terminate(&mut self) -> MediaResult<()> {
        self.fake.terminations.fetch_add(1, Ordering::SeqCst);
        if self.fake.honors_terminate {
            self.terminated = true;
        }
        Ok(())
    }

    async fn kill(&mut self) -> MediaResult<()> {
        self.fake.kills.fetch_add(1, Ordering::SeqCst);
        self.terminated = true;
        Ok(())
    }
}

/// Config with a long deadline and a private work directory.
pub fn test_config(dir: &TempDir, capacity: usize) -> WorkerConfig {
    WorkerConfig {
        max_concurrent_processes: capacity,
        process_timeout: Duration::from_secs(30),
        termination_grace: Duration::from_millis(100),
        work_dir: dir.path().join("work"),
        upload_dir: dir.path().join("uploads"),
        shutdown_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// Write an upload of `size` bytes and describe it.
pub fn upload(dir: &TempDir, name: &str, kind: MediaKind, size: usize) -> InputDescriptor {
    let uploads = dir.path().join("uploads");
    std::fs::create_dir_all(&uploads).unwrap();
    let path = uploads.join(name);
    std::fs::write(&path, vec![7u8; size]).unwrap();
    InputDescriptor::new(path, kind, size as u64)
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
