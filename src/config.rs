//! Capture configuration
//!
//! One immutable value object carries every fixed parameter of a session:
//! the duration cap, the output geometry, storage thresholds and the device
//! identifiers handed to the ffmpeg backend. It is built once at start-up and
//! passed explicitly to whatever needs it.

use crate::capture::traits::{CameraPosition, Resolution};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Fixed parameters for capture, recording and transform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    /// Recording length cap in seconds (also the transform time range)
    pub max_duration_secs: u32,

    /// Final output width in pixels
    pub output_width: u32,

    /// Final output height in pixels
    pub output_height: u32,

    /// Frame rate used for capture and for the transform stages
    pub frame_rate: u32,

    /// Recording is refused when less free space than this is available
    pub min_free_disk_bytes: u64,

    /// Directory for raw and intermediate movie files
    pub temp_dir: PathBuf,

    /// Directory the final clip is saved into
    pub library_dir: PathBuf,

    /// Camera used when the session starts
    pub default_position: CameraPosition,

    /// Capture resolution requested from the camera
    pub session_preset: Resolution,

    /// Apply video stabilization on the recording connection
    pub stabilization: bool,

    /// Record an audio track alongside the video
    pub capture_audio: bool,

    /// Device identifiers for the ffmpeg backend
    pub devices: DeviceConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 90,
            output_width: 300,
            output_height: 300,
            frame_rate: 30,
            min_free_disk_bytes: 1024 * 1024,
            temp_dir: std::env::temp_dir(),
            library_dir: default_library_dir(),
            default_position: CameraPosition::Front,
            session_preset: Resolution {
                width: 640,
                height: 480,
            },
            stabilization: true,
            capture_audio: true,
            devices: DeviceConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Load configuration from a JSON file, or use defaults when no path is given.
    ///
    /// Missing fields fall back to their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                let config: CaptureConfig = serde_json::from_str(&content)?;
                tracing::debug!("Loaded configuration from {:?}", path);
                config
            }
            None => CaptureConfig::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive a session.
    ///
    /// A zero duration cap is accepted: the timer finishes on its first tick.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_width == 0 || self.output_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "output size must be non-zero, got {}x{}",
                self.output_width, self.output_height
            )));
        }
        if self.frame_rate == 0 {
            return Err(ConfigError::Invalid("frame rate must be non-zero".to_string()));
        }
        if self.session_preset.width == 0 || self.session_preset.height == 0 {
            return Err(ConfigError::Invalid("session preset must be non-zero".to_string()));
        }
        self.devices.validate(self.capture_audio)?;

        if self.max_duration_secs == 0 {
            tracing::warn!("max duration is 0; recordings will stop on the first tick");
        }
        Ok(())
    }
}

/// Device identifiers passed to ffmpeg
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
    /// ffmpeg input format for cameras (`v4l2`, `avfoundation`, `dshow`)
    pub video_format: String,

    /// ffmpeg input format for the microphone
    pub audio_format: String,

    /// Front camera identifier
    pub front: String,

    /// Back camera identifier
    pub back: String,

    /// Microphone identifier
    pub audio: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        #[cfg(target_os = "macos")]
        {
            Self {
                video_format: "avfoundation".to_string(),
                audio_format: "avfoundation".to_string(),
                front: "0".to_string(),
                back: "1".to_string(),
                audio: ":0".to_string(),
            }
        }

        #[cfg(target_os = "windows")]
        {
            Self {
                video_format: "dshow".to_string(),
                audio_format: "dshow".to_string(),
                front: "video=Front Camera".to_string(),
                back: "video=Rear Camera".to_string(),
                audio: "audio=Microphone".to_string(),
            }
        }

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            Self {
                video_format: "v4l2".to_string(),
                audio_format: "pulse".to_string(),
                front: "/dev/video0".to_string(),
                back: "/dev/video1".to_string(),
                audio: "default".to_string(),
            }
        }
    }
}

impl DeviceConfig {
    /// Identifier configured for a camera position
    pub fn camera(&self, position: CameraPosition) -> &str {
        match position {
            CameraPosition::Front => &self.front,
            CameraPosition::Back => &self.back,
        }
    }

    fn validate(&self, capture_audio: bool) -> Result<(), ConfigError> {
        if self.video_format.trim().is_empty() {
            return Err(ConfigError::Invalid("video format is empty".to_string()));
        }
        if self.front.trim().is_empty() && self.back.trim().is_empty() {
            return Err(ConfigError::Invalid("no camera configured".to_string()));
        }
        if capture_audio && (self.audio_format.trim().is_empty() || self.audio.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "audio capture enabled but no microphone configured".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_library_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join("Movies").join("SquareCam"),
        None => std::env::temp_dir().join("squarecam-library"),
    }
}
