//! FFmpeg-backed transcoder.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::command::{check_ffmpeg, FfmpegCommand};
use crate::copy::CopyTranscoder;
use crate::error::MediaResult;
use crate::presets::apply_preset;
use crate::process::ChildProcess;
use crate::transcoder::{TranscodeProcess, TranscodeRequest, Transcoder};

/// Runs FFmpeg with the preset for each request.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
}

impl FfmpegTranscoder {
    /// Locate FFmpeg on `PATH`.
    pub fn new() -> MediaResult<Self> {
        let binary = check_ffmpeg()?;
        Ok(Self { binary })
    }

    /// Use an explicit FFmpeg binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Command that would be run for `request`.
    pub fn command_for(&self, request: &TranscodeRequest) -> FfmpegCommand {
        apply_preset(
            FfmpegCommand::new(&request.input, &request.output),
            request.kind,
            request.preset,
        )
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn start(&self, request: &TranscodeRequest) -> MediaResult<Box<dyn TranscodeProcess>> {
        let args = self.command_for(request).build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let program = self.binary.to_string_lossy().to_string();
        let process = ChildProcess::spawn(&program, &args)?;
        Ok(Box::new(process))
    }
}

/// Pick FFmpeg when installed, otherwise fall back to copying input to output.
pub fn detect_transcoder() -> Arc<dyn Transcoder> {
    match FfmpegTranscoder::new() {
        Ok(ffmpeg) => {
            info!(binary = %ffmpeg.binary.display(), "Using FFmpeg transcoder");
            Arc::new(ffmpeg)
        }
        Err(_) => {
            warn!("FFmpeg not found, outputs will be plain copies of the input");
            Arc::new(CopyTranscoder::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcomp_models::{MediaKind, QualityPreset};

    #[test]
    fn test_command_for_audio_request() {
        let transcoder = FfmpegTranscoder::with_binary("/usr/bin/ffmpeg");
        let request = TranscodeRequest::new(
            "/work/in.wav",
            "/work/out.mp3",
            MediaKind::Audio,
            QualityPreset::High,
        );

        let args = transcoder.command_for(&request).build_args();
        assert!(args.contains(&"libmp3lame".to_string()));
        assert!(args.contains(&"96k".to_string()));
        assert_eq!(args.last().unwrap(), "/work/out.mp3");
    }

    #[test]
    fn test_detect_transcoder_always_returns_one() {
        let transcoder = detect_transcoder();
        assert!(matches!(transcoder.name(), "ffmpeg" | "copy"));
    }
}
