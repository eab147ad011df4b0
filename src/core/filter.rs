//! Anti-alias low-pass used ahead of upward rate transposition.
//!
//! Each channel runs two cascaded 2nd-order Butterworth sections (24 dB/oct).

use std::f64::consts::PI;

const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Cutoff as a fraction of the post-transposition Nyquist frequency.
const CUTOFF_MARGIN: f64 = 0.9;

/// Direct Form I biquad with coefficients normalized by a0.
#[derive(Debug, Clone)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    fn lowpass(freq: f64, sample_rate: u32) -> Self {
        let w0 = 2.0 * PI * freq / sample_rate as f64;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * BUTTERWORTH_Q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    #[inline]
    fn process_sample(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }

    fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Multi-channel 4th-order low-pass over interleaved samples.
#[derive(Debug, Clone)]
pub struct AntiAliasFilter {
    sections: Vec<[Biquad; 2]>,
}

impl AntiAliasFilter {
    /// Builds a filter that keeps content representable after the signal is
    /// played back `rate` times faster. Returns `None` when no filtering is
    /// needed (`rate <= 1`).
    pub fn for_rate(rate: f64, sample_rate: u32, channels: usize) -> Option<Self> {
        if rate <= 1.0 {
            return None;
        }
        let cutoff = CUTOFF_MARGIN * 0.5 * sample_rate as f64 / rate;
        let sections = (0..channels.max(1))
            .map(|_| {
                [
                    Biquad::lowpass(cutoff, sample_rate),
                    Biquad::lowpass(cutoff, sample_rate),
                ]
            })
            .collect();
        Some(Self { sections })
    }

    /// Filters interleaved samples in place.
    pub fn process(&mut self, samples: &mut [f32]) {
        let channels = self.sections.len();
        for frame in samples.chunks_exact_mut(channels) {
            for (s, stages) in frame.iter_mut().zip(self.sections.iter_mut()) {
                let x = stages[0].process_sample(*s as f64);
                *s = stages[1].process_sample(x) as f32;
            }
        }
    }

    pub fn reset(&mut self) {
        for stages in &mut self.sections {
            stages[0].reset();
            stages[1].reset();
        }
    }
}
