//! Engine configuration
//!
//! Every section has working default values, so `EngineConfig::default()` is a
//! complete configuration; a TOML file only needs to name the fields it changes.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::Error;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio: AudioMixConfig,
    pub video: VideoTileConfig,
    pub group: GroupConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Audio mixing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioMixConfig {
    /// Target sample rate for the mixed stream (contributions are resampled to it)
    pub sample_rate: u32,

    /// Channel count of the mixed stream
    pub channels: u16,

    /// Duration of one mix cycle in milliseconds
    pub cycle_ms: u32,

    /// Fixed per-contributor attenuation weight
    pub mix_weight: f64,
}

impl AudioMixConfig {
    /// Samples per channel emitted each mix cycle
    pub fn cycle_samples(&self) -> usize {
        (self.sample_rate as usize * self.cycle_ms as usize) / 1000
    }
}

impl Default for AudioMixConfig {
    fn default() -> Self {
        Self {
            sample_rate: MIX_SAMPLE_RATE,
            channels: MIX_CHANNELS,
            cycle_ms: MIX_CYCLE_MS,
            mix_weight: MIX_WEIGHT,
        }
    }
}

/// Video tiling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoTileConfig {
    /// Width every contribution is scaled to before tiling
    pub tile_width: u32,

    /// Height every contribution is scaled to before tiling
    pub tile_height: u32,
}

impl Default for VideoTileConfig {
    fn default() -> Self {
        Self {
            tile_width: TILE_WIDTH,
            tile_height: TILE_HEIGHT,
        }
    }
}

/// Call group parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    /// Settle window between the last expected contribution and going live,
    /// in milliseconds; restarts whenever a new contribution arrives
    pub settle_delay_ms: u64,
}

impl GroupConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: SETTLE_DELAY_MS,
        }
    }
}
