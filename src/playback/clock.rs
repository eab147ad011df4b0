//! Conversion between original-time and real-time.
//!
//! Original-time is the timeline of the unmodified source. Real-time is the
//! timeline of the tempo-stretched output actually streaming to the sink.
//! At `+100%` tempo one second of real-time covers two seconds of source.

use crate::core::types::validate_tempo;
use crate::error::EngineError;

/// Tempo-aware mapping between the two time bases, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackClock {
    tempo_change_percent: f64,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self {
            tempo_change_percent: 0.0,
        }
    }
}

impl PlaybackClock {
    /// # Errors
    /// [`EngineError::InvalidParameter`] for `-100%` or below, or a
    /// non-finite value.
    pub fn new(tempo_change_percent: f64) -> Result<Self, EngineError> {
        validate_tempo(tempo_change_percent)?;
        Ok(Self {
            tempo_change_percent,
        })
    }

    #[inline]
    pub fn tempo_change_percent(&self) -> f64 {
        self.tempo_change_percent
    }

    /// `time_us * 100 / (100 + tempo)`, rounded.
    #[inline]
    pub fn to_real(&self, original_us: i64) -> i64 {
        (original_us as f64 * 100.0 / (100.0 + self.tempo_change_percent)).round() as i64
    }

    /// `time_us * (100 + tempo) / 100`, rounded.
    #[inline]
    pub fn to_original(&self, real_us: i64) -> i64 {
        (real_us as f64 * (100.0 + self.tempo_change_percent) / 100.0).round() as i64
    }
}

/// One-shot form of [`PlaybackClock::to_real`].
pub fn to_real(time_us: i64, tempo_change_percent: f64) -> Result<i64, EngineError> {
    Ok(PlaybackClock::new(tempo_change_percent)?.to_real(time_us))
}

/// One-shot form of [`PlaybackClock::to_original`].
pub fn to_original(time_us: i64, tempo_change_percent: f64) -> Result<i64, EngineError> {
    Ok(PlaybackClock::new(tempo_change_percent)?.to_original(time_us))
}
