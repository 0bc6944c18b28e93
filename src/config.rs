use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Lowest output frame rate the render loop accepts
pub const MIN_FPS: u32 = 24;

/// Main configuration for the Headline-Compositor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output canvas and frame rate settings
    pub output: OutputConfig,

    /// Timeline construction settings
    pub timeline: TimelineConfig,

    /// Asset loading settings
    pub loader: LoaderConfig,

    /// Encoder backend settings
    pub encoder: EncoderConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.output.validate()?;
        self.timeline.validate()?;
        self.loader.validate()?;
        self.encoder.validate()?;
        Ok(())
    }
}

/// Output aspect ratio selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 1920x1080
    #[default]
    #[serde(rename = "16:9")]
    Landscape,

    /// 1080x1920
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    /// Fixed pixel dimensions (width, height) for this aspect ratio
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            AspectRatio::Landscape => (1920, 1080),
            AspectRatio::Portrait => (1080, 1920),
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AspectRatio::Landscape => f.write_str("16:9"),
            AspectRatio::Portrait => f.write_str("9:16"),
        }
    }
}

impl FromStr for AspectRatio {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "16:9" | "landscape" => Ok(AspectRatio::Landscape),
            "9:16" | "portrait" => Ok(AspectRatio::Portrait),
            other => Err(ConfigError::InvalidValue {
                key: "output.aspect".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Output canvas configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output aspect ratio
    pub aspect: AspectRatio,

    /// Output frame rate (frames per second)
    pub fps: u32,

    /// Quality setting (0-100, higher is better)
    pub quality: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            aspect: AspectRatio::Landscape,
            fps: 30,
            quality: 75,
        }
    }
}

impl OutputConfig {
    fn validate(&self) -> Result<()> {
        if self.fps < MIN_FPS || self.fps > 120 {
            return Err(ConfigError::InvalidValue {
                key: "output.fps".to_string(),
                value: self.fps.to_string()
            }.into());
        }

        if self.quality > 100 {
            return Err(ConfigError::InvalidValue {
                key: "output.quality".to_string(),
                value: self.quality.to_string()
            }.into());
        }

        Ok(())
    }
}

/// Timeline construction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Seconds each still image stays on screen
    pub default_image_duration: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self { default_image_duration: 5.0 }
    }
}

impl TimelineConfig {
    fn validate(&self) -> Result<()> {
        if !self.default_image_duration.is_finite() || self.default_image_duration <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "timeline.default_image_duration".to_string(),
                value: self.default_image_duration.to_string()
            }.into());
        }
        Ok(())
    }
}

/// Asset loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Per-asset load budget in seconds
    pub load_timeout_secs: u64,

    /// Maximum number of assets decoded at once
    pub max_concurrent_loads: usize,

    /// Longest side, in pixels, that decoded video frames are kept at
    pub max_video_edge: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            load_timeout_secs: 30,
            max_concurrent_loads: num_cpus::get(),
            max_video_edge: 1280,
        }
    }
}

impl LoaderConfig {
    /// Per-asset load budget
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.load_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "loader.load_timeout_secs".to_string(),
                value: self.load_timeout_secs.to_string()
            }.into());
        }

        if self.max_concurrent_loads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "loader.max_concurrent_loads".to_string(),
                value: self.max_concurrent_loads.to_string()
            }.into());
        }

        if self.max_video_edge < 16 {
            return Err(ConfigError::InvalidValue {
                key: "loader.max_video_edge".to_string(),
                value: self.max_video_edge.to_string()
            }.into());
        }

        Ok(())
    }
}

/// Encoder backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// ffmpeg executable
    pub ffmpeg_path: String,

    /// ffprobe executable
    pub ffprobe_path: String,

    /// Video codec passed to ffmpeg
    pub video_codec: String,

    /// x264 preset
    pub preset: String,

    /// AAC bitrate in kbps
    pub audio_bitrate_kbps: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            audio_bitrate_kbps: 128,
        }
    }
}

impl EncoderConfig {
    fn validate(&self) -> Result<()> {
        if self.ffmpeg_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "encoder.ffmpeg_path".to_string(),
                value: self.ffmpeg_path.clone()
            }.into());
        }

        if self.audio_bitrate_kbps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "encoder.audio_bitrate_kbps".to_string(),
                value: self.audio_bitrate_kbps.to_string()
            }.into());
        }

        Ok(())
    }
}
