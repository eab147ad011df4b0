use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Tempo range over which sequence and seek lengths are interpolated.
const AUTO_TEMPO_LOW: f64 = 0.5;
const AUTO_TEMPO_HIGH: f64 = 2.0;
/// Sequence length (ms) at the low and high ends of the auto range.
const AUTO_SEQ_AT_LOW: f64 = 125.0;
const AUTO_SEQ_AT_HIGH: f64 = 50.0;
/// Seek window length (ms) at the low and high ends of the auto range.
const AUTO_SEEK_AT_LOW: f64 = 25.0;
const AUTO_SEEK_AT_HIGH: f64 = 15.0;

/// Smallest overlap in frames regardless of sample rate.
const MIN_OVERLAP_FRAMES: usize = 16;

/// Tempo factors accepted by the WSOLA stage.
pub const TEMPO_MIN: f64 = 0.01;
pub const TEMPO_MAX: f64 = 100.0;

/// User-facing tuning of the time-stretch stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StretchSettings {
    /// Length of one processed sequence in ms; `None` picks it from the tempo.
    pub sequence_ms: Option<f64>,
    /// Length of the similarity search window in ms; `None` picks it from the tempo.
    pub seek_window_ms: Option<f64>,
    /// Cross-fade length between sequences in ms.
    pub overlap_ms: f64,
    /// Coarse-to-fine search instead of testing every candidate offset.
    pub quick_seek: bool,
    /// Low-pass the signal before transposing the pitch upwards.
    pub anti_alias: bool,
}

impl Default for StretchSettings {
    fn default() -> Self {
        Self {
            sequence_ms: None,
            seek_window_ms: None,
            overlap_ms: 8.0,
            quick_seek: true,
            anti_alias: true,
        }
    }
}

impl StretchSettings {
    pub fn with_sequence_ms(mut self, ms: f64) -> Self {
        self.sequence_ms = Some(ms);
        self
    }

    pub fn with_seek_window_ms(mut self, ms: f64) -> Self {
        self.seek_window_ms = Some(ms);
        self
    }

    pub fn with_overlap_ms(mut self, ms: f64) -> Self {
        self.overlap_ms = ms;
        self
    }

    pub fn with_quick_seek(mut self, enabled: bool) -> Self {
        self.quick_seek = enabled;
        self
    }

    pub fn with_anti_alias(mut self, enabled: bool) -> Self {
        self.anti_alias = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(EngineError::Config(format!("{} must be positive, got {}", name, v)))
            }
        };
        positive("overlap_ms", self.overlap_ms)?;
        if let Some(v) = self.sequence_ms {
            positive("sequence_ms", v)?;
            if v < 2.0 * self.overlap_ms {
                return Err(EngineError::Config(format!(
                    "sequence_ms ({}) must be at least twice overlap_ms ({})",
                    v, self.overlap_ms
                )));
            }
        }
        if let Some(v) = self.seek_window_ms {
            positive("seek_window_ms", v)?;
        }
        Ok(())
    }
}

/// Frame counts derived from [`StretchSettings`] for one tempo and sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct WsolaParams {
    pub tempo: f64,
    pub channels: usize,
    /// Frames per processed sequence, overlap included.
    pub sequence_frames: usize,
    /// Number of candidate offsets examined per sequence.
    pub seek_frames: usize,
    pub overlap_frames: usize,
    pub quick_seek: bool,
}

impl WsolaParams {
    pub fn new(
        settings: &StretchSettings,
        tempo: f64,
        sample_rate: u32,
        channels: usize,
    ) -> Result<Self, EngineError> {
        if !(TEMPO_MIN..=TEMPO_MAX).contains(&tempo) {
            return Err(EngineError::InvalidParameter(format!(
                "effective tempo factor must be between {} and {}, got {}",
                TEMPO_MIN, TEMPO_MAX, tempo
            )));
        }
        settings.validate()?;

        let clamped = tempo.clamp(AUTO_TEMPO_LOW, AUTO_TEMPO_HIGH);
        let sequence_ms = settings
            .sequence_ms
            .unwrap_or_else(|| auto_interpolate(clamped, AUTO_SEQ_AT_LOW, AUTO_SEQ_AT_HIGH));
        let seek_ms = settings
            .seek_window_ms
            .unwrap_or_else(|| auto_interpolate(clamped, AUTO_SEEK_AT_LOW, AUTO_SEEK_AT_HIGH));

        let ms_to_frames = |ms: f64| (ms * sample_rate as f64 / 1000.0).round() as usize;
        let overlap_frames = ms_to_frames(settings.overlap_ms).max(MIN_OVERLAP_FRAMES);
        let sequence_frames = ms_to_frames(sequence_ms).max(2 * overlap_frames + 1);
        let seek_frames = ms_to_frames(seek_ms).max(1);

        Ok(Self {
            tempo,
            channels: channels.max(1),
            sequence_frames,
            seek_frames,
            overlap_frames,
            quick_seek: settings.quick_seek,
        })
    }

    /// Input frames advanced per sequence.
    #[inline]
    pub fn nominal_skip(&self) -> f64 {
        self.tempo * (self.sequence_frames - self.overlap_frames) as f64
    }

    /// Input frames that must be buffered before one sequence can be produced.
    pub fn frames_required(&self) -> usize {
        let by_search = self.seek_frames + self.sequence_frames;
        let by_skip = self.nominal_skip().ceil() as usize + self.overlap_frames;
        by_search.max(by_skip)
    }
}

/// Linear interpolation between the low- and high-tempo values.
fn auto_interpolate(tempo: f64, at_low: f64, at_high: f64) -> f64 {
    let slope = (at_high - at_low) / (AUTO_TEMPO_HIGH - AUTO_TEMPO_LOW);
    at_low + slope * (tempo - AUTO_TEMPO_LOW)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_sequence_follows_tempo() {
        let s = StretchSettings::default();
        let slow = WsolaParams::new(&s, 0.5, 44100, 2).unwrap();
        let fast = WsolaParams::new(&s, 2.0, 44100, 2).unwrap();
        let faster = WsolaParams::new(&s, 4.0, 44100, 2).unwrap();
        assert_eq!(slow.sequence_frames, (0.125f64 * 44100.0).round() as usize);
        assert_eq!(fast.sequence_frames, (0.050f64 * 44100.0).round() as usize);
        // Clamped outside the auto range.
        assert_eq!(faster.sequence_frames, fast.sequence_frames);
        assert!(slow.seek_frames > fast.seek_frames);
    }

    #[test]
    fn test_explicit_lengths() {
        let s = StretchSettings::default()
            .with_sequence_ms(40.0)
            .with_seek_window_ms(15.0)
            .with_overlap_ms(8.0);
        let p = WsolaParams::new(&s, 1.0, 48000, 1).unwrap();
        assert_eq!(p.sequence_frames, 1920);
        assert_eq!(p.seek_frames, 720);
        assert_eq!(p.overlap_frames, 384);
        assert!((p.nominal_skip() - 1536.0).abs() < 1e-9);
        assert_eq!(p.frames_required(), 1920 + 720);
    }

    #[test]
    fn test_invalid_settings() {
        let s = StretchSettings::default().with_overlap_ms(0.0);
        assert!(s.validate().is_err());
        let s = StretchSettings::default().with_sequence_ms(10.0);
        assert!(s.validate().is_err());
        assert!(WsolaParams::new(&StretchSettings::default(), 0.001, 44100, 2).is_err());
        assert!(WsolaParams::new(&StretchSettings::default(), 1000.0, 44100, 2).is_err());
    }
}
