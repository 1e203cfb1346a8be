use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("sampling interval must be a positive integer")]
    ZeroInterval,
    #[error("analysis resolution must be non-zero, got {width}x{height}")]
    ZeroResolution { width: u32, height: u32 },
    #[error("overlay font scale must be a positive number, got {0}")]
    InvalidFontScale(f32),
    #[error("unknown preset: {0} (expected low-latency or memory-conservative)")]
    UnknownPreset(String),
}

/// Reference tradeoffs between responsiveness and compute load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// Analyze every 10th frame at 224x224.
    #[default]
    LowLatency,
    /// Analyze every 30th frame at 96x96.
    MemoryConservative,
}

impl Preset {
    pub fn sampling_interval(self) -> NonZeroU32 {
        match self {
            Preset::LowLatency => NonZeroU32::new(10),
            Preset::MemoryConservative => NonZeroU32::new(30),
        }
        .unwrap_or(NonZeroU32::MIN)
    }

    pub fn analysis_resolution(self) -> (u32, u32) {
        match self {
            Preset::LowLatency => (224, 224),
            Preset::MemoryConservative => (96, 96),
        }
    }

    pub fn config(self) -> PipelineConfig {
        let (analysis_width, analysis_height) = self.analysis_resolution();
        PipelineConfig {
            sampling_interval: self.sampling_interval(),
            analysis_width,
            analysis_height,
            overlay: OverlayConfig::default(),
        }
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low-latency" | "low_latency" => Ok(Preset::LowLatency),
            "memory-conservative" | "memory_conservative" => Ok(Preset::MemoryConservative),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }
}

/// Placement and typeface of the result caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Left edge of the caption, in frame pixels.
    pub origin_x: i32,
    /// Baseline of the caption, in frame pixels.
    pub origin_y: i32,
    /// Glyph height in pixels.
    pub font_scale: f32,
    /// TrueType font used for the caption. When unset, well-known system
    /// fonts are tried and the caption falls back to the colored strip only.
    pub font_path: Option<PathBuf>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            origin_x: 10,
            origin_y: 30,
            font_scale: 32.0,
            font_path: None,
        }
    }
}

/// Frame pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Analyze one frame out of every `sampling_interval`.
    pub sampling_interval: NonZeroU32,
    /// Width of the down-scaled analysis copy.
    pub analysis_width: u32,
    /// Height of the down-scaled analysis copy.
    pub analysis_height: u32,
    pub overlay: OverlayConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Preset::default().config()
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis_width == 0 || self.analysis_height == 0 {
            return Err(ConfigError::ZeroResolution {
                width: self.analysis_width,
                height: self.analysis_height,
            });
        }
        let scale = self.overlay.font_scale;
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ConfigError::InvalidFontScale(scale));
        }
        Ok(())
    }

    pub fn analysis_resolution(&self) -> (u32, u32) {
        (self.analysis_width, self.analysis_height)
    }
}
