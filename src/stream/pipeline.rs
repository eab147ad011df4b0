//! Whole-buffer rendering through the streaming tempo/pitch processor.

use crate::core::pcm::PcmBuffer;
use crate::core::types::StretchParameters;
use crate::error::EngineError;
use crate::stream::processor::StreamProcessor;
use crate::stretch::params::StretchSettings;

/// Default block size drawn from the input per iteration, in frames.
pub const DEFAULT_CHUNK_FRAMES: usize = 4096;

/// Renders a whole [`PcmBuffer`] through a [`StreamProcessor`].
///
/// Holds no audio between calls: every call builds a fresh processor, so one
/// instance may be shared freely and calls never influence each other.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeStretchProcessor {
    settings: StretchSettings,
    chunk_frames: usize,
}

impl Default for TimeStretchProcessor {
    fn default() -> Self {
        Self::new(StretchSettings::default(), DEFAULT_CHUNK_FRAMES)
    }
}

impl TimeStretchProcessor {
    pub fn new(settings: StretchSettings, chunk_frames: usize) -> Self {
        Self {
            settings,
            chunk_frames: chunk_frames.max(1),
        }
    }

    pub fn with_settings(mut self, settings: StretchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_chunk_frames(mut self, chunk_frames: usize) -> Self {
        self.chunk_frames = chunk_frames.max(1);
        self
    }

    #[inline]
    pub fn settings(&self) -> &StretchSettings {
        &self.settings
    }

    #[inline]
    pub fn chunk_frames(&self) -> usize {
        self.chunk_frames
    }

    /// Produces a new buffer in the input's format with tempo and pitch
    /// altered independently.
    ///
    /// Samples are processed as normalized floats and saturated back into the
    /// integer range on output. The identity parameters give a type-converted
    /// copy of the input.
    ///
    /// # Errors
    /// [`EngineError::UnsupportedFormat`] if the input format cannot be
    /// processed, [`EngineError::InvalidParameter`] for a degenerate tempo or
    /// out-of-range pitch.
    pub fn process(
        &self,
        input: &PcmBuffer,
        parameters: StretchParameters,
    ) -> Result<PcmBuffer, EngineError> {
        self.process_with_progress(input, parameters, |_| {})
    }

    /// Like [`process`](Self::process), reporting the fraction of input
    /// consumed (0.0 to 1.0) after every block.
    pub fn process_with_progress(
        &self,
        input: &PcmBuffer,
        parameters: StretchParameters,
        mut progress: impl FnMut(f32),
    ) -> Result<PcmBuffer, EngineError> {
        let format = *input.format();
        format.validate()?;
        let channels = format.channel_count as usize;

        let mut processor =
            StreamProcessor::new(format.sample_rate, channels, &self.settings, parameters)?;
        let mut output = PcmBuffer::new(format)?;

        let total = input.sample_count();
        let block = self.chunk_frames * channels;
        let mut chunk = Vec::with_capacity(block);
        let mut rendered = Vec::with_capacity(block * 2);
        let mut offset = 0;

        log::debug!(
            "processing {} frames: tempo {:+}%, pitch {:+} st",
            input.frame_count(),
            parameters.tempo_change_percent,
            parameters.pitch_change_semitones
        );

        while offset < total {
            chunk.clear();
            let n = input.read_samples_into(offset, block, &mut chunk);
            offset += n;

            processor.put_samples(&chunk);
            rendered.clear();
            processor.receive_all(&mut rendered);
            output.append_samples(&rendered)?;

            progress(offset as f32 / total as f32);
        }

        processor.flush();
        rendered.clear();
        processor.receive_all(&mut rendered);
        output.append_samples(&rendered)?;
        progress(1.0);

        log::debug!(
            "processed {:.3}s into {:.3}s",
            input.duration_seconds(),
            output.duration_seconds()
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AudioFormat, SampleKind};

    fn stereo_sine(frames: usize) -> PcmBuffer {
        let mut samples = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let t = i as f32 / 44100.0;
            samples.push((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5);
            samples.push((2.0 * std::f32::consts::PI * 660.0 * t).sin() * 0.5);
        }
        PcmBuffer::from_samples(AudioFormat::pcm16(2, 44100), &samples).unwrap()
    }

    #[test]
    fn test_identity_copies_samples() {
        let input = stereo_sine(10_000);
        let out = TimeStretchProcessor::default()
            .process(&input, StretchParameters::identity())
            .unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_identity_unsigned_8bit() {
        let format = AudioFormat::new(1, 8000, 8, SampleKind::Unsigned).unwrap();
        let bytes: Vec<u8> = (0..=255u8).collect();
        let input = PcmBuffer::from_decoded(format, bytes).unwrap();
        let out = TimeStretchProcessor::new(StretchSettings::default(), 100)
            .process(&input, StretchParameters::identity())
            .unwrap();
        assert_eq!(out.bytes(), input.bytes());
    }

    #[test]
    fn test_double_tempo_halves_duration() {
        let input = stereo_sine(44100 * 2);
        let out = TimeStretchProcessor::default()
            .process(&input, StretchParameters::new(100.0, 0))
            .unwrap();
        let ratio = out.duration_seconds() / input.duration_seconds();
        assert!((ratio - 0.5).abs() < 0.01, "ratio {}", ratio);
    }

    #[test]
    fn test_progress_is_monotonic_and_complete() {
        let input = stereo_sine(20_000);
        let mut seen = Vec::new();
        TimeStretchProcessor::new(StretchSettings::default(), 1024)
            .process_with_progress(&input, StretchParameters::new(25.0, -3), |p| seen.push(p))
            .unwrap();
        assert!(seen.len() > 10);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last().copied(), Some(1.0));
    }

    #[test]
    fn test_output_saturates() {
        let format = AudioFormat::pcm16(1, 44100);
        let loud: Vec<f32> = (0..20_000)
            .map(|i| if i % 40 < 20 { 0.999 } else { -0.999 })
            .collect();
        let input = PcmBuffer::from_samples(format, &loud).unwrap();
        let out = TimeStretchProcessor::default()
            .process(&input, StretchParameters::new(0.0, 5))
            .unwrap();
        // Interpolation overshoots full scale; every sample must still decode in range.
        let samples = out.sample_window(0, out.sample_count());
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_invalid_tempo() {
        let input = stereo_sine(100);
        let err = TimeStretchProcessor::default()
            .process(&input, StretchParameters::new(-100.0, 0))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)));
    }
}
