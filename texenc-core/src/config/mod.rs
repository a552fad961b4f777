//! Configuration types for texenc
//!
//! Provides the encoder session configuration, codec identifiers and
//! container selection.

mod file;

pub use file::{sample_config, ConfigFile};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EncodeError, Result};

/// Default output width
pub const DEFAULT_WIDTH: u32 = 640;
/// Default output height
pub const DEFAULT_HEIGHT: u32 = 480;
/// Default bit rate in bits per second
pub const DEFAULT_BIT_RATE: u32 = 500_000;
/// Default frame rate
pub const DEFAULT_FRAME_RATE: u32 = 30;
/// Default key-frame interval in seconds
pub const DEFAULT_KEY_FRAME_INTERVAL: u32 = 15;

/// Video codec for encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// H.264 / AVC (most compatible)
    #[default]
    H264,
    /// H.265 / HEVC (better compression)
    Hevc,
    /// AV1 (best compression, newer GPUs only)
    Av1,
}

impl Codec {
    /// MIME identifier used to request an encoder
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::H264 => "video/avc",
            Self::Hevc => "video/hevc",
            Self::Av1 => "video/av01",
        }
    }

    /// Resolve a MIME identifier
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "video/avc" | "video/h264" => Some(Self::H264),
            "video/hevc" | "video/h265" => Some(Self::Hevc),
            "video/av01" | "video/av1" => Some(Self::Av1),
            _ => None,
        }
    }

    /// FFmpeg encoder names to try, hardware first
    pub fn encoder_candidates(&self) -> &'static [&'static str] {
        match self {
            Self::H264 => &["h264_nvenc", "libx264", "libopenh264"],
            Self::Hevc => &["hevc_nvenc", "libx265"],
            Self::Av1 => &["av1_nvenc", "libsvtav1", "libaom-av1"],
        }
    }

    /// Get the codec name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::H264 => "H.264",
            Self::Hevc => "HEVC",
            Self::Av1 => "AV1",
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(codec) = Self::from_mime(s) {
            return Ok(codec);
        }
        match s.to_lowercase().as_str() {
            "h264" | "avc" | "264" => Ok(Self::H264),
            "hevc" | "h265" | "265" => Ok(Self::Hevc),
            "av1" => Ok(Self::Av1),
            _ => Err(format!("Unknown codec: {}", s)),
        }
    }
}

/// Container written by the muxer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    /// MPEG-4 Part 14
    #[default]
    Mp4,
    /// Matroska
    Matroska,
    /// WebM (Matroska subset)
    WebM,
}

impl Container {
    /// Pick a container from a file extension, defaulting to MP4
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4")
            .to_lowercase();

        match extension.as_str() {
            "mkv" => Self::Matroska,
            "webm" => Self::WebM,
            _ => Self::Mp4,
        }
    }

    /// FFmpeg muxer short name
    pub fn format_name(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Matroska => "matroska",
            Self::WebM => "webm",
        }
    }
}

/// Encode session configuration
///
/// Immutable once a session has been initialized with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Output container path
    pub output_path: PathBuf,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Codec MIME identifier (e.g. "video/avc")
    pub mime_type: String,
    /// Target bit rate in bits per second
    pub bit_rate: u32,
    /// Target frame rate
    pub frame_rate: u32,
    /// Maximum spacing between key frames, in seconds
    pub key_frame_interval: u32,
}

impl EncoderConfig {
    /// Create a configuration with defaults for everything but the output path
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            mime_type: Codec::H264.mime_type().to_string(),
            bit_rate: DEFAULT_BIT_RATE,
            frame_rate: DEFAULT_FRAME_RATE,
            key_frame_interval: DEFAULT_KEY_FRAME_INTERVAL,
        }
    }

    /// Set output dimensions
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the codec
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.mime_type = codec.mime_type().to_string();
        self
    }

    /// Set the MIME type directly
    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = mime.into();
        self
    }

    /// Set the bit rate (bits per second)
    pub fn with_bit_rate(mut self, bit_rate: u32) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    /// Set the frame rate
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps;
        self
    }

    /// Set the key-frame interval (seconds)
    pub fn with_key_frame_interval(mut self, seconds: u32) -> Self {
        self.key_frame_interval = seconds;
        self
    }

    /// Codec for the configured MIME type
    pub fn codec(&self) -> Option<Codec> {
        Codec::from_mime(&self.mime_type)
    }

    /// Container derived from the output path
    pub fn container(&self) -> Container {
        Container::from_path(&self.output_path)
    }

    /// Microseconds between consecutive frames
    pub fn frame_interval_us(&self) -> u64 {
        1_000_000 / self.frame_rate.max(1) as u64
    }

    /// Key-frame interval expressed in frames
    pub fn gop_frames(&self) -> u32 {
        self.key_frame_interval.saturating_mul(self.frame_rate).max(1)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.output_path.as_os_str().is_empty() {
            return Err(EncodeError::config("Output path is empty"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(EncodeError::config(format!(
                "Output size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.frame_rate == 0 {
            return Err(EncodeError::config("Frame rate must be greater than zero"));
        }
        if self.bit_rate == 0 {
            return Err(EncodeError::config("Bit rate must be greater than zero"));
        }
        if self.codec().is_none() {
            return Err(EncodeError::config(format!(
                "Unsupported MIME type: {}",
                self.mime_type
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EncoderConfig::new("/tmp/out.mp4");
        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!(config.mime_type, "video/avc");
        assert_eq!(config.bit_rate, 500_000);
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.key_frame_interval, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frame_interval() {
        let config = EncoderConfig::new("/tmp/out.mp4").with_frame_rate(10);
        assert_eq!(config.frame_interval_us(), 100_000);
        assert_eq!(config.gop_frames(), 150);

        let config = config.with_frame_rate(30);
        assert_eq!(config.frame_interval_us(), 33_333);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let base = EncoderConfig::new("/tmp/out.mp4");
        assert!(base.clone().with_size(0, 480).validate().is_err());
        assert!(base.clone().with_frame_rate(0).validate().is_err());
        assert!(base.clone().with_bit_rate(0).validate().is_err());
        assert!(base.clone().with_mime_type("video/mpeg2").validate().is_err());
        assert!(EncoderConfig::new("").validate().is_err());
    }

    #[test]
    fn test_codec_parsing() {
        assert_eq!("h264".parse::<Codec>().unwrap(), Codec::H264);
        assert_eq!("video/hevc".parse::<Codec>().unwrap(), Codec::Hevc);
        assert_eq!("AV1".parse::<Codec>().unwrap(), Codec::Av1);
        assert!("mpeg2".parse::<Codec>().is_err());
        assert_eq!(Codec::from_mime("VIDEO/AVC"), Some(Codec::H264));
    }

    #[test]
    fn test_container_from_path() {
        assert_eq!(Container::from_path(Path::new("a.mp4")), Container::Mp4);
        assert_eq!(Container::from_path(Path::new("a.MKV")), Container::Matroska);
        assert_eq!(Container::from_path(Path::new("a.webm")), Container::WebM);
        assert_eq!(Container::from_path(Path::new("noext")), Container::Mp4);
    }
}
