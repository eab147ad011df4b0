//! Streaming rate transposition via 4-point Hermite interpolation.
//!
//! Playing a signal `rate` times faster scales every frequency by `rate` and
//! divides its length by `rate`. Combined with an inverse tempo change this
//! yields a pitch shift that leaves duration untouched.

use crate::core::fifo::SampleFifo;
use crate::core::filter::AntiAliasFilter;

/// Interleaved streaming resampler.
#[derive(Debug, Clone)]
pub struct RateTransposer {
    rate: f64,
    channels: usize,
    /// Pending input frames; index 0 is the oldest frame still needed.
    history: Vec<f32>,
    /// Fractional read position of the next output frame within `history`.
    pos: f64,
    filter: Option<AntiAliasFilter>,
    frames_in: u64,
    frames_out: u64,
}

impl RateTransposer {
    /// Creates a transposer reading `rate` input frames per output frame.
    ///
    /// When `anti_alias` is set and `rate > 1`, input is low-passed first.
    pub fn new(rate: f64, sample_rate: u32, channels: usize, anti_alias: bool) -> Self {
        let channels = channels.max(1);
        let filter = if anti_alias {
            AntiAliasFilter::for_rate(rate, sample_rate, channels)
        } else {
            None
        };
        Self {
            rate,
            channels,
            history: Vec::new(),
            pos: 0.0,
            filter,
            frames_in: 0,
            frames_out: 0,
        }
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Frames held back waiting for interpolation neighbours.
    #[inline]
    pub fn pending_frames(&self) -> usize {
        self.history.len() / self.channels
    }

    /// Feeds interleaved input and appends every frame that can be produced.
    pub fn process(&mut self, input: &[f32], out: &mut SampleFifo) {
        let start = self.history.len();
        self.history.extend_from_slice(input);
        if let Some(filter) = self.filter.as_mut() {
            filter.process(&mut self.history[start..]);
        }
        self.frames_in += (input.len() / self.channels) as u64;
        self.interpolate(out);
    }

    /// Emits the tail so that total output equals `frames_in / rate`.
    pub fn flush(&mut self, out: &mut SampleFifo) {
        let expected = (self.frames_in as f64 / self.rate).round() as u64;
        if self.frames_out < expected {
            let pad = self.rate.ceil() as usize + 3;
            self.history
                .resize(self.history.len() + pad * self.channels, 0.0);
            self.interpolate(out);
        }
        if self.frames_out > expected {
            let surplus = (self.frames_out - expected) as usize;
            let keep = out.frames().saturating_sub(surplus);
            out.truncate_frames(keep);
            self.frames_out = expected;
        }
        self.clear();
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.pos = 0.0;
        self.frames_in = 0;
        self.frames_out = 0;
        if let Some(filter) = self.filter.as_mut() {
            filter.reset();
        }
    }

    fn interpolate(&mut self, out: &mut SampleFifo) {
        let nc = self.channels;
        let frames = self.history.len() / nc;
        let mut frame_buf = vec![0.0f32; nc];

        while (self.pos as usize) + 2 < frames {
            let idx = self.pos as usize;
            let frac = (self.pos - idx as f64) as f32;
            let i0 = idx.saturating_sub(1);
            for (ch, slot) in frame_buf.iter_mut().enumerate() {
                let s0 = self.history[i0 * nc + ch];
                let s1 = self.history[idx * nc + ch];
                let s2 = self.history[(idx + 1) * nc + ch];
                let s3 = self.history[(idx + 2) * nc + ch];

                let c0 = s1;
                let c1 = 0.5 * (s2 - s0);
                let c2 = s0 - 2.5 * s1 + 2.0 * s2 - 0.5 * s3;
                let c3 = 0.5 * (s3 - s0) + 1.5 * (s1 - s2);
                *slot = ((c3 * frac + c2) * frac + c1) * frac + c0;
            }
            out.put(&frame_buf);
            self.frames_out += 1;
            self.pos += self.rate;
        }

        // Keep one frame of left context for the next call.
        let drop = (self.pos as usize).saturating_sub(1).min(frames);
        if drop > 0 {
            self.history.drain(..drop * nc);
            self.pos -= drop as f64;
        }
    }
}
