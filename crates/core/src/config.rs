//! Streaming quality presets and the immutable stream configuration.

use std::fmt;
use std::str::FromStr;

use crate::error::RtspError;

/// Audio sample rate shared by every preset (Hz).
pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 48_000;

/// Audio channel count shared by every preset.
pub const DEFAULT_AUDIO_CHANNELS: u8 = 2;

/// Named quality levels a client may request with `SET_PARAMETER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QualityPreset {
    /// 640x480 @ 15fps, 0.5 Mbps video.
    Low,
    /// 1280x720 @ 24fps, 1.5 Mbps video.
    Medium,
    /// 1280x720 @ 30fps, 2 Mbps video.
    #[default]
    High,
    /// 1920x1080 @ 30fps, 4 Mbps video.
    Ultra,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 4] = [Self::Low, Self::Medium, Self::High, Self::Ultra];

    pub fn name(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Ultra => "ultra",
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QualityPreset {
    type Err = RtspError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| RtspError::UnsupportedParameter(format!("quality: {wanted}")))
    }
}

/// Video and audio encoding parameters for one encoder instance.
///
/// Never mutated in place: a quality change builds a fresh value and
/// replaces the active one wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingConfig {
    pub video_width: u32,
    pub video_height: u32,
    /// Video bitrate in bits per second.
    pub video_bitrate: u32,
    pub video_fps: u32,
    /// Audio bitrate in bits per second.
    pub audio_bitrate: u32,
    pub audio_sample_rate: u32,
    pub audio_channels: u8,
}

impl StreamingConfig {
    pub fn from_preset(preset: QualityPreset) -> Self {
        let (video_width, video_height, video_bitrate, video_fps, audio_bitrate) = match preset {
            QualityPreset::Low => (640, 480, 500_000, 15, 64_000),
            QualityPreset::Medium => (1280, 720, 1_500_000, 24, 96_000),
            QualityPreset::High => (1280, 720, 2_000_000, 30, 128_000),
            QualityPreset::Ultra => (1920, 1080, 4_000_000, 30, 192_000),
        };
        Self {
            video_width,
            video_height,
            video_bitrate,
            video_fps,
            audio_bitrate,
            audio_sample_rate: DEFAULT_AUDIO_SAMPLE_RATE,
            audio_channels: DEFAULT_AUDIO_CHANNELS,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self::from_preset(QualityPreset::default())
    }
}

impl fmt::Display for StreamingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} @ {}fps, {:.1} Mbps video, {} kbps audio",
            self.video_width,
            self.video_height,
            self.video_fps,
            f64::from(self.video_bitrate) / 1_000_000.0,
            self.audio_bitrate / 1000
        )
    }
}
