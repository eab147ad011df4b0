use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Microseconds per second, the unit all timeline values are expressed in.
pub const MICROS_PER_SEC: i64 = 1_000_000;

/// How an integer or float sample word is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleKind {
    /// Two's complement integer.
    Signed,
    /// Offset-binary integer (silence sits at the midpoint).
    Unsigned,
    /// IEEE-754 float, nominal range -1.0..=1.0.
    Float,
}

/// Layout of interleaved PCM data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub channel_count: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub sample_kind: SampleKind,
}

impl AudioFormat {
    /// Creates a format and checks it against the supported widths.
    pub fn new(
        channel_count: u16,
        sample_rate: u32,
        bits_per_sample: u16,
        sample_kind: SampleKind,
    ) -> Result<Self, EngineError> {
        let format = Self {
            channel_count,
            sample_rate,
            bits_per_sample,
            sample_kind,
        };
        format.validate()?;
        Ok(format)
    }

    /// Signed 16-bit PCM, the most common container layout.
    pub fn pcm16(channel_count: u16, sample_rate: u32) -> Self {
        Self {
            channel_count,
            sample_rate,
            bits_per_sample: 16,
            sample_kind: SampleKind::Signed,
        }
    }

    /// Checks channel count, sample rate, bit depth and sample kind.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.channel_count == 0 {
            return Err(EngineError::UnsupportedFormat(
                "channel count must be at least 1".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(EngineError::UnsupportedFormat(
                "sample rate must be positive".to_string(),
            ));
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(EngineError::UnsupportedFormat(format!(
                "unsupported bit depth: {}",
                self.bits_per_sample
            )));
        }
        if self.sample_kind == SampleKind::Float && self.bits_per_sample != 32 {
            return Err(EngineError::UnsupportedFormat(format!(
                "float samples must be 32 bits wide, got {}",
                self.bits_per_sample
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Bytes occupied by one interleaved frame.
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.bytes_per_sample() * self.channel_count as usize
    }

    /// Bytes consumed per second of playback.
    #[inline]
    pub fn bytes_per_second(&self) -> usize {
        self.frame_size() * self.sample_rate as usize
    }
}

/// Tempo and pitch alteration applied to the source.
///
/// `(0.0, 0)` is the identity passthrough.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StretchParameters {
    /// Speed change in percent: +100 plays twice as fast, -50 at half speed.
    pub tempo_change_percent: f64,
    /// Pitch shift in semitones, independent of duration.
    pub pitch_change_semitones: i32,
}

/// Largest pitch shift accepted in either direction.
pub const PITCH_LIMIT_SEMITONES: i32 = 36;

impl StretchParameters {
    pub fn new(tempo_change_percent: f64, pitch_change_semitones: i32) -> Self {
        Self {
            tempo_change_percent,
            pitch_change_semitones,
        }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.tempo_change_percent == 0.0 && self.pitch_change_semitones == 0
    }

    /// Playback speed factor: 1.0 is unchanged, 2.0 twice as fast.
    #[inline]
    pub fn tempo_factor(&self) -> f64 {
        1.0 + self.tempo_change_percent / 100.0
    }

    /// Frequency factor of the pitch shift: 2.0 is one octave up.
    #[inline]
    pub fn pitch_factor(&self) -> f64 {
        2.0_f64.powf(self.pitch_change_semitones as f64 / 12.0)
    }

    /// Rejects the degenerate -100% tempo and out-of-range values.
    pub fn validate(&self) -> Result<(), EngineError> {
        validate_tempo(self.tempo_change_percent)?;
        if self.pitch_change_semitones.abs() > PITCH_LIMIT_SEMITONES {
            return Err(EngineError::InvalidParameter(format!(
                "pitch change must be within ±{} semitones, got {}",
                PITCH_LIMIT_SEMITONES, self.pitch_change_semitones
            )));
        }
        Ok(())
    }
}

/// Checks that a tempo change maps to a finite, positive speed factor.
pub fn validate_tempo(tempo_change_percent: f64) -> Result<(), EngineError> {
    if !tempo_change_percent.is_finite() || tempo_change_percent <= -100.0 {
        return Err(EngineError::InvalidParameter(format!(
            "tempo change must be finite and greater than -100%, got {}",
            tempo_change_percent
        )));
    }
    Ok(())
}

/// Restricted region of original-time eligible for playback and export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackWindow {
    pub start_time_us: i64,
    /// Absolute end, or [`PlaybackWindow::END_OF_SOURCE`].
    pub end_time_us: i64,
}

impl PlaybackWindow {
    /// Sentinel end value meaning "until the end of the source".
    pub const END_OF_SOURCE: i64 = -1;

    pub fn new(start_time_us: i64, end_time_us: i64) -> Self {
        Self {
            start_time_us,
            end_time_us,
        }
    }

    /// The whole source: `[0, end of source]`.
    pub fn full() -> Self {
        Self::new(0, Self::END_OF_SOURCE)
    }

    /// Replaces the sentinel (or any non-positive end) by `duration_us` and
    /// clamps both ends to the source.
    pub fn resolve(&self, duration_us: i64) -> Result<PlaybackWindow, EngineError> {
        if self.start_time_us < 0 {
            return Err(EngineError::InvalidParameter(format!(
                "window start must not be negative, got {}",
                self.start_time_us
            )));
        }
        let end = if self.end_time_us > 0 {
            self.end_time_us.min(duration_us)
        } else {
            duration_us
        };
        if self.start_time_us >= end {
            return Err(EngineError::InvalidParameter(format!(
                "window [{}, {}] is empty for a source of {} us",
                self.start_time_us, self.end_time_us, duration_us
            )));
        }
        Ok(PlaybackWindow::new(self.start_time_us, end))
    }

    #[inline]
    pub fn length_us(&self) -> i64 {
        self.end_time_us - self.start_time_us
    }

    #[inline]
    pub fn contains(&self, time_us: i64) -> bool {
        time_us >= self.start_time_us && time_us <= self.end_time_us
    }

    #[inline]
    pub fn clamp(&self, time_us: i64) -> i64 {
        time_us.clamp(self.start_time_us, self.end_time_us)
    }
}

impl Default for PlaybackWindow {
    fn default() -> Self {
        Self::full()
    }
}

/// Transport state of a loaded engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Elapsed time in original-time coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position {
    pub play_time_us: i64,
}

impl Position {
    pub fn new(play_time_us: i64) -> Self {
        Self { play_time_us }
    }

    pub fn secs(&self) -> f64 {
        self.play_time_us as f64 / MICROS_PER_SEC as f64
    }
}
