use crate::core::fifo::SampleFifo;
use crate::core::resample::RateTransposer;
use crate::core::types::StretchParameters;
use crate::error::EngineError;
use crate::stretch::params::StretchSettings;
use crate::stretch::wsola::Wsola;

/// Input frames the rate transposer holds back for interpolation.
const TRANSPOSER_LATENCY_FRAMES: usize = 3;

/// One stage of the tempo/pitch chain.
enum Stage {
    Tempo(Wsola),
    Rate(RateTransposer),
}

impl Stage {
    fn process(&mut self, input: &[f32], out: &mut SampleFifo) {
        match self {
            Stage::Tempo(w) => w.process(input, out),
            Stage::Rate(r) => r.process(input, out),
        }
    }

    fn flush(&mut self, out: &mut SampleFifo) {
        match self {
            Stage::Tempo(w) => w.flush(out),
            Stage::Rate(r) => r.flush(out),
        }
    }

    fn clear(&mut self) {
        match self {
            Stage::Tempo(w) => w.clear(),
            Stage::Rate(r) => r.clear(),
        }
    }

    /// Latency in this stage's own input frames.
    fn latency_frames(&self) -> usize {
        match self {
            Stage::Tempo(w) => w.latency_frames(),
            Stage::Rate(_) => TRANSPOSER_LATENCY_FRAMES,
        }
    }

    /// Input frames consumed per output frame.
    fn speed(&self) -> f64 {
        match self {
            Stage::Tempo(w) => w.tempo(),
            Stage::Rate(r) => r.rate(),
        }
    }
}

/// Streaming tempo and pitch processor over interleaved float samples.
///
/// Tempo is changed by a WSOLA stage; pitch by resampling through a
/// [`RateTransposer`] whose duration change is cancelled by running the
/// WSOLA stage at `tempo / rate`. When pitching up the tempo stage runs
/// first so the transposer sees fewer frames; when pitching down the
/// transposer runs first for the same reason.
///
/// Output is produced asynchronously relative to input: a call to
/// [`put_samples`](Self::put_samples) may make zero frames available, or
/// more than were fed. [`flush`](Self::flush) releases the tail.
pub struct StreamProcessor {
    channels: usize,
    sample_rate: u32,
    parameters: StretchParameters,
    first: Option<Stage>,
    second: Option<Stage>,
    link: SampleFifo,
    output: SampleFifo,
}

impl StreamProcessor {
    /// Builds the stage chain for `parameters`.
    ///
    /// # Errors
    /// [`EngineError::UnsupportedFormat`] for zero channels or sample rate,
    /// [`EngineError::InvalidParameter`] for out-of-range parameters.
    pub fn new(
        sample_rate: u32,
        channels: usize,
        settings: &StretchSettings,
        parameters: StretchParameters,
    ) -> Result<Self, EngineError> {
        if channels == 0 || sample_rate == 0 {
            return Err(EngineError::UnsupportedFormat(format!(
                "cannot stretch {} channel(s) at {} Hz",
                channels, sample_rate
            )));
        }
        parameters.validate()?;
        settings.validate()?;

        let tempo = parameters.tempo_factor();
        let rate = parameters.pitch_factor();
        let stage_tempo = tempo / rate;

        let tempo_stage = if stage_tempo == 1.0 {
            None
        } else {
            Some(Stage::Tempo(Wsola::new(
                settings,
                stage_tempo,
                sample_rate,
                channels,
            )?))
        };
        let rate_stage = if rate == 1.0 {
            None
        } else {
            Some(Stage::Rate(RateTransposer::new(
                rate,
                sample_rate,
                channels,
                settings.anti_alias,
            )))
        };

        let (first, second) = match (tempo_stage, rate_stage) {
            (Some(t), Some(r)) if rate > 1.0 => (Some(t), Some(r)),
            (Some(t), Some(r)) => (Some(r), Some(t)),
            (Some(t), None) => (Some(t), None),
            (None, Some(r)) => (Some(r), None),
            (None, None) => (None, None),
        };

        log::debug!(
            "stream processor: tempo x{:.4}, pitch x{:.4}, {} stage(s)",
            tempo,
            rate,
            first.is_some() as usize + second.is_some() as usize
        );

        Ok(Self {
            channels,
            sample_rate,
            parameters,
            first,
            second,
            link: SampleFifo::new(channels),
            output: SampleFifo::new(channels),
        })
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn parameters(&self) -> StretchParameters {
        self.parameters
    }

    /// True when input is passed straight through.
    #[inline]
    pub fn is_bypass(&self) -> bool {
        self.first.is_none()
    }

    /// Feeds interleaved samples. A trailing partial frame is ignored.
    pub fn put_samples(&mut self, samples: &[f32]) {
        let whole = samples.len() - samples.len() % self.channels;
        debug_assert_eq!(whole, samples.len(), "partial frame fed to processor");
        let samples = &samples[..whole];
        match (self.first.as_mut(), self.second.as_mut()) {
            (None, _) => self.output.put(samples),
            (Some(first), None) => first.process(samples, &mut self.output),
            (Some(first), Some(second)) => {
                first.process(samples, &mut self.link);
                second.process(self.link.as_slice(), &mut self.output);
                self.link.clear();
            }
        }
    }

    /// Frames ready to be received.
    #[inline]
    pub fn available_frames(&self) -> usize {
        self.output.frames()
    }

    /// Moves up to `out.len() / channels` frames into `out`. Returns frames moved.
    pub fn receive_samples(&mut self, out: &mut [f32]) -> usize {
        self.output.receive(out)
    }

    /// Appends every available sample to `out`.
    pub fn receive_all(&mut self, out: &mut Vec<f32>) {
        self.output.drain_into(out);
    }

    /// Pushes buffered input through every stage. After this the processor
    /// is empty and ready for a new stream.
    pub fn flush(&mut self) {
        match (self.first.as_mut(), self.second.as_mut()) {
            (None, _) => {}
            (Some(first), None) => first.flush(&mut self.output),
            (Some(first), Some(second)) => {
                first.flush(&mut self.link);
                second.process(self.link.as_slice(), &mut self.output);
                self.link.clear();
                second.flush(&mut self.output);
            }
        }
    }

    /// Drops buffered input and output.
    pub fn clear(&mut self) {
        for stage in [self.first.as_mut(), self.second.as_mut()].into_iter().flatten() {
            stage.clear();
        }
        self.link.clear();
        self.output.clear();
    }

    /// Input frames that must be fed before output starts flowing.
    pub fn latency_frames(&self) -> usize {
        match (self.first.as_ref(), self.second.as_ref()) {
            (None, _) => 0,
            (Some(first), None) => first.latency_frames(),
            (Some(first), Some(second)) => {
                let second_in_source = second.latency_frames() as f64 * first.speed();
                first.latency_frames() + second_in_source.ceil() as usize
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(frames: usize, channels: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let v = (2.0 * PI * 330.0 * i as f32 / 44100.0).sin() * 0.4;
            for _ in 0..channels {
                out.push(v);
            }
        }
        out
    }

    fn render(proc: &mut StreamProcessor, input: &[f32], chunk_frames: usize) -> Vec<f32> {
        let mut out = Vec::new();
        for chunk in input.chunks(chunk_frames * proc.channels()) {
            proc.put_samples(chunk);
            proc.receive_all(&mut out);
        }
        proc.flush();
        proc.receive_all(&mut out);
        out
    }

    #[test]
    fn test_identity_is_bypass() {
        let mut p =
            StreamProcessor::new(44100, 2, &StretchSettings::default(), StretchParameters::identity())
                .unwrap();
        assert!(p.is_bypass());
        assert_eq!(p.latency_frames(), 0);
        let input = sine(1000, 2);
        assert_eq!(render(&mut p, &input, 256), input);
    }

    #[test]
    fn test_tempo_changes_duration() {
        let input = sine(44100, 2);
        let mut p = StreamProcessor::new(
            44100,
            2,
            &StretchSettings::default(),
            StretchParameters::new(100.0, 0),
        )
        .unwrap();
        let out = render(&mut p, &input, 4096);
        assert_eq!(out.len() / 2, 22050);
    }

    #[test]
    fn test_pitch_keeps_duration() {
        let input = sine(44100, 1);
        for semitones in [-12, -5, 7, 12] {
            let mut p = StreamProcessor::new(
                44100,
                1,
                &StretchSettings::default(),
                StretchParameters::new(0.0, semitones),
            )
            .unwrap();
            assert!(!p.is_bypass());
            let out = render(&mut p, &input, 4096);
            let diff = (out.len() as i64 - 44100).abs();
            assert!(diff <= 2, "semitones {}: {} frames", semitones, out.len());
        }
    }

    #[test]
    fn test_receive_samples_in_small_pieces() {
        let input = sine(20_000, 1);
        let mut p = StreamProcessor::new(
            44100,
            1,
            &StretchSettings::default(),
            StretchParameters::new(-20.0, 0),
        )
        .unwrap();
        p.put_samples(&input);
        p.flush();
        let mut total = 0;
        let mut buf = [0.0f32; 100];
        loop {
            let n = p.receive_samples(&mut buf);
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, 25_000);
    }

    #[test]
    fn test_rejects_bad_input() {
        let s = StretchSettings::default();
        assert!(matches!(
            StreamProcessor::new(44100, 0, &s, StretchParameters::identity()),
            Err(EngineError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            StreamProcessor::new(44100, 2, &s, StretchParameters::new(-100.0, 0)),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_clear_discards_state() {
        let mut p = StreamProcessor::new(
            44100,
            1,
            &StretchSettings::default(),
            StretchParameters::new(30.0, 2),
        )
        .unwrap();
        p.put_samples(&sine(30_000, 1));
        p.clear();
        assert_eq!(p.available_frames(), 0);
    }
}
