//! FFmpeg CLI wrapper for audio and video compression.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with the quality preset tables
//! - The [`Transcoder`] / [`TranscodeProcess`] seam the scheduler drives
//! - A child-process handle supporting graceful termination and forced kill
//! - A copy fallback used when FFmpeg is not installed

pub mod command;
pub mod copy;
pub mod error;
pub mod ffmpeg;
pub mod presets;
pub mod process;
pub mod transcoder;

pub use command::{check_ffmpeg, FfmpegCommand};
pub use copy::CopyTranscoder;
pub use error::{MediaError, MediaResult};
pub use ffmpeg::{detect_transcoder, FfmpegTranscoder};
pub use presets::{apply_preset, AudioSettings, VideoSettings};
pub use process::ChildProcess;
pub use transcoder::{inspect_output, TranscodeProcess, TranscodeRequest, Transcoder};
