//! Configuration file loading
//!
//! Loads user configuration from `~/.config/texenc/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{
    Codec, EncoderConfig, DEFAULT_BIT_RATE, DEFAULT_FRAME_RATE, DEFAULT_HEIGHT,
    DEFAULT_KEY_FRAME_INTERVAL, DEFAULT_WIDTH,
};
use crate::error::{EncodeError, Result};

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Encoder defaults
    #[serde(default)]
    pub encoder: EncoderSettings,

    /// Output settings
    #[serde(default)]
    pub output: OutputSettings,
}

/// Default encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSettings {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Codec (h264, hevc, av1 or a MIME type)
    #[serde(default = "default_codec")]
    pub codec: String,

    /// Bit rate in bits per second
    #[serde(default = "default_bit_rate")]
    pub bit_rate: u32,

    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Key-frame interval in seconds
    #[serde(default = "default_key_frame_interval")]
    pub key_frame_interval: u32,
}

/// Output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Directory relative output paths are resolved against
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_width() -> u32 {
    DEFAULT_WIDTH
}

fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

fn default_codec() -> String {
    "h264".to_string()
}

fn default_bit_rate() -> u32 {
    DEFAULT_BIT_RATE
}

fn default_frame_rate() -> u32 {
    DEFAULT_FRAME_RATE
}

fn default_key_frame_interval() -> u32 {
    DEFAULT_KEY_FRAME_INTERVAL
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            codec: default_codec(),
            bit_rate: default_bit_rate(),
            frame_rate: default_frame_rate(),
            key_frame_interval: default_key_frame_interval(),
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("texenc").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("texenc")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/texenc/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| EncodeError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| EncodeError::Config(format!("Failed to parse config file: {}", e)))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    EncodeError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| EncodeError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| EncodeError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Resolve an output path against the configured output directory
    pub fn resolve_output(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        match &self.output.directory {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Build a session configuration for an output path from these defaults
    pub fn encoder_config(&self, output_path: impl AsRef<Path>) -> Result<EncoderConfig> {
        let codec: Codec = self
            .encoder
            .codec
            .parse()
            .map_err(EncodeError::Config)?;

        Ok(EncoderConfig::new(self.resolve_output(output_path))
            .with_size(self.encoder.width, self.encoder.height)
            .with_codec(codec)
            .with_bit_rate(self.encoder.bit_rate)
            .with_frame_rate(self.encoder.frame_rate)
            .with_key_frame_interval(self.encoder.key_frame_interval))
    }

    /// Check that these defaults would pass session validation
    ///
    /// Returns the session configuration they produce for a placeholder
    /// `.mp4` output.
    pub fn validated(&self) -> Result<EncoderConfig> {
        let config = self.encoder_config("texenc.mp4")?;
        config.validate()?;
        Ok(config)
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# texenc configuration

[encoder]
# Output size in pixels
width = 640
height = 480

# Video codec: h264, hevc, av1 (or a MIME type such as "video/avc")
codec = "h264"

# Bit rate in bits per second
bit_rate = 500000

# Frames per second; timestamps advance by 1_000_000 / frame_rate microseconds
frame_rate = 30

# Maximum seconds between key frames
key_frame_interval = 15

[output]
# Relative output paths are resolved against this directory
# directory = "/home/me/Videos"
"#
    .to_string()
}
