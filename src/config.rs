//! Engine configuration, loadable from JSON.

use crate::error::EngineError;
use crate::stream::pipeline::{TimeStretchProcessor, DEFAULT_CHUNK_FRAMES};
use crate::stretch::params::StretchSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Runtime settings of the [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames per channel drawn from the source per processing block.
    pub chunk_frames: usize,
    /// Cadence of sink progress notifications.
    pub notify_interval_ms: u64,
    /// Initial output gain in `(0, 1]`.
    pub volume: f32,
    pub stretch: StretchSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            notify_interval_ms: 10,
            volume: 0.8,
            stretch: StretchSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_chunk_frames(mut self, frames: usize) -> Self {
        self.chunk_frames = frames;
        self
    }

    pub fn with_notify_interval_ms(mut self, ms: u64) -> Self {
        self.notify_interval_ms = ms;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_stretch(mut self, stretch: StretchSettings) -> Self {
        self.stretch = stretch;
        self
    }

    #[inline]
    pub fn notify_interval(&self) -> Duration {
        Duration::from_millis(self.notify_interval_ms)
    }

    /// Processor configured from `chunk_frames` and `stretch`.
    pub fn processor(&self) -> TimeStretchProcessor {
        TimeStretchProcessor::new(self.stretch.clone(), self.chunk_frames)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.chunk_frames == 0 {
            return Err(EngineError::Config("chunk_frames must be at least 1".into()));
        }
        if self.notify_interval_ms == 0 {
            return Err(EngineError::Config(
                "notify_interval_ms must be at least 1".into(),
            ));
        }
        if !(self.volume > 0.0 && self.volume <= 1.0) {
            return Err(EngineError::Config(format!(
                "volume must lie in (0, 1], got {}",
                self.volume
            )));
        }
        self.stretch.validate()
    }

    /// Parses and validates a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("failed to parse engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("failed to serialize engine config: {}", e)))
    }

    /// Reads a JSON config file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data).map_err(|e| match e {
            EngineError::Config(msg) => {
                EngineError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
