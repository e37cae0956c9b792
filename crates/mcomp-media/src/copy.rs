//! Fallback transcoder that copies the input unchanged.

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::error::{MediaError, MediaResult};
use crate::transcoder::{TranscodeProcess, TranscodeRequest, Transcoder};

/// Copies input to output. Used when FFmpeg is not installed.
#[derive(Debug, Clone, Default)]
pub struct CopyTranscoder;

impl CopyTranscoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transcoder for CopyTranscoder {
    fn name(&self) -> &'static str {
        "copy"
    }

    async fn start(&self, request: &TranscodeRequest) -> MediaResult<Box<dyn TranscodeProcess>> {
        let input = request.input.clone();
        let output = request.output.clone();
        let task = tokio::spawn(async move { tokio::fs::copy(&input, &output).await.map(|_| ()) });
        Ok(Box::new(CopyProcess { task: Some(task) }))
    }
}

struct CopyProcess {
    task: Option<JoinHandle<std::io::Result<()>>>,
}

#[async_trait]
impl TranscodeProcess for CopyProcess {
    async fn wait(&mut self) -> MediaResult<()> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let result = task.await;
        self.task = None;
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(MediaError::Terminated),
        }
    }

    fn terminate(&mut self) -> MediaResult<()> {
        if let Some(task) = &self.task {
            task.abort();
        }
        Ok(())
    }

    async fn kill(&mut self) -> MediaResult<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        Ok(())
    }
}
