//! Compression settings per media kind and quality preset.

use mcomp_models::{MediaKind, QualityPreset};

use crate::command::FfmpegCommand;

/// Audio codec used for every audio preset.
pub const AUDIO_CODEC: &str = "libmp3lame";
/// Video codec used for every video preset.
pub const VIDEO_CODEC: &str = "libx264";
/// Audio codec used inside compressed videos.
pub const VIDEO_AUDIO_CODEC: &str = "aac";

/// Audio compression settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSettings {
    pub bitrate: &'static str,
    pub channels: u8,
}

impl AudioSettings {
    pub fn for_preset(preset: QualityPreset) -> Self {
        match preset {
            QualityPreset::High => Self { bitrate: "96k", channels: 2 },
            QualityPreset::Medium => Self { bitrate: "64k", channels: 2 },
            QualityPreset::Low => Self { bitrate: "32k", channels: 1 },
        }
    }
}

/// Video compression settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSettings {
    /// Output height; width keeps the aspect ratio
    pub height: u32,
    pub fps: u32,
    pub crf: u8,
    pub audio_bitrate: &'static str,
}

impl VideoSettings {
    pub fn for_preset(preset: QualityPreset) -> Self {
        match preset {
            QualityPreset::High => Self {
                height: 480,
                fps: 25,
                crf: 23,
                audio_bitrate: "64k",
            },
            QualityPreset::Medium => Self {
                height: 360,
                fps: 20,
                crf: 28,
                audio_bitrate: "48k",
            },
            QualityPreset::Low => Self {
                height: 270,
                fps: 15,
                crf: 32,
                audio_bitrate: "32k",
            },
        }
    }

    /// Scale filter keeping an even width.
    pub fn scale_filter(&self) -> String {
        format!("scale=-2:{}", self.height)
    }
}

/// Append the output arguments for `kind` at `preset`.
pub fn apply_preset(cmd: FfmpegCommand, kind: MediaKind, preset: QualityPreset) -> FfmpegCommand {
    match kind {
        MediaKind::Audio => {
            let settings = AudioSettings::for_preset(preset);
            cmd.audio_codec(AUDIO_CODEC)
                .audio_bitrate(settings.bitrate)
                .audio_channels(settings.channels)
        }
        MediaKind::Video => {
            let settings = VideoSettings::for_preset(preset);
            cmd.video_filter(settings.scale_filter())
                .frame_rate(settings.fps)
                .video_codec(VIDEO_CODEC)
                .crf(settings.crf)
                .audio_codec(VIDEO_AUDIO_CODEC)
                .audio_bitrate(settings.audio_bitrate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_for(kind: MediaKind, preset: QualityPreset) -> Vec<String> {
        apply_preset(FfmpegCommand::new("in", "out"), kind, preset).build_args()
    }

    fn value_after(args: &[String], flag: &str) -> String {
        let pos = args.iter().position(|a| a == flag).unwrap();
        args[pos + 1].clone()
    }

    #[test]
    fn test_low_audio_is_mono() {
        let args = args_for(MediaKind::Audio, QualityPreset::Low);
        assert_eq!(value_after(&args, "-c:a"), "libmp3lame");
        assert_eq!(value_after(&args, "-b:a"), "32k");
        assert_eq!(value_after(&args, "-ac"), "1");
    }

    #[test]
    fn test_medium_video_settings() {
        let args = args_for(MediaKind::Video, QualityPreset::Medium);
        assert_eq!(value_after(&args, "-vf"), "scale=-2:360");
        assert_eq!(value_after(&args, "-r"), "20");
        assert_eq!(value_after(&args, "-c:v"), "libx264");
        assert_eq!(value_after(&args, "-crf"), "28");
        assert_eq!(value_after(&args, "-c:a"), "aac");
        assert_eq!(value_after(&args, "-b:a"), "48k");
    }

    #[test]
    fn test_higher_presets_keep_more_quality() {
        let high = VideoSettings::for_preset(QualityPreset::High);
        let low = VideoSettings::for_preset(QualityPreset::Low);
        assert!(high.height > low.height);
        assert!(high.crf < low.crf);

        let high_audio = AudioSettings::for_preset(QualityPreset::High);
        assert_eq!(high_audio.bitrate, "96k");
        assert_eq!(high_audio.channels, 2);
    }
}
