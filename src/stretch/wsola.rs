//! Streaming WSOLA (Waveform Similarity Overlap-Add) tempo stage.
//!
//! Input is cut into sequences of `sequence_frames`. Each new sequence is
//! placed at the offset within the seek window whose leading overlap best
//! matches the tail of the previous sequence, then cross-faded onto it. The
//! input read pointer advances by `tempo * (sequence - overlap)` frames per
//! sequence while the output grows by `sequence - overlap`, which changes the
//! duration by `1 / tempo` and leaves the pitch alone.

use crate::core::fifo::SampleFifo;
use crate::error::EngineError;
use crate::stretch::params::{StretchSettings, WsolaParams};
use rustfft::{num_complex::Complex, FftPlanner};

/// Minimum energy threshold to avoid division by near-zero in correlation normalization.
const ENERGY_EPSILON: f64 = 1e-12;
/// Minimum number of candidates to justify FFT-based correlation over direct computation.
const FFT_CANDIDATE_THRESHOLD: usize = 64;
/// Minimum overlap length for FFT-based correlation to be worthwhile.
const FFT_OVERLAP_THRESHOLD: usize = 32;
/// Coarse scan stride of the quick seek, in frames.
const QUICK_SEEK_STRIDE: usize = 8;

/// Multi-channel streaming WSOLA processor over interleaved samples.
pub struct Wsola {
    params: WsolaParams,
    input: SampleFifo,
    /// Tail overlap of the previously emitted sequence.
    mid_buffer: Vec<f32>,
    /// `mid_buffer` weighted by a parabolic slope, used as search reference.
    reference: Vec<f32>,
    crossfade: Vec<f32>,
    skip_fract: f64,
    is_beginning: bool,
    frames_in: u64,
    frames_out: u64,
    planner: FftPlanner<f32>,
}

impl Wsola {
    pub fn new(
        settings: &StretchSettings,
        tempo: f64,
        sample_rate: u32,
        channels: usize,
    ) -> Result<Self, EngineError> {
        let params = WsolaParams::new(settings, tempo, sample_rate, channels)?;
        let overlap_samples = params.overlap_frames * params.channels;
        Ok(Self {
            input: SampleFifo::new(params.channels),
            mid_buffer: vec![0.0; overlap_samples],
            reference: vec![0.0; overlap_samples],
            crossfade: vec![0.0; overlap_samples],
            skip_fract: 0.0,
            is_beginning: true,
            frames_in: 0,
            frames_out: 0,
            planner: FftPlanner::new(),
            params,
        })
    }

    #[inline]
    pub fn params(&self) -> &WsolaParams {
        &self.params
    }

    #[inline]
    pub fn tempo(&self) -> f64 {
        self.params.tempo
    }

    /// Input frames buffered before the first sequence can be emitted.
    #[inline]
    pub fn latency_frames(&self) -> usize {
        self.params.frames_required()
    }

    /// Input frames currently waiting in the stage.
    #[inline]
    pub fn pending_frames(&self) -> usize {
        self.input.frames()
    }

    /// Feeds interleaved input; every sequence that can be completed is
    /// appended to `out`. May emit nothing, or more frames than were fed.
    pub fn process(&mut self, input: &[f32], out: &mut SampleFifo) {
        self.input.put(input);
        self.frames_in += (input.len() / self.params.channels) as u64;
        self.process_sequences(out);
    }

    /// Pushes the buffered tail through the stage and trims the output so
    /// that the total emitted equals `frames_in / tempo`.
    pub fn flush(&mut self, out: &mut SampleFifo) {
        let expected = (self.frames_in as f64 / self.params.tempo).round() as u64;
        while self.frames_out < expected {
            self.input.put_silence(self.params.frames_required());
            self.process_sequences(out);
        }
        if self.frames_out > expected {
            let surplus = (self.frames_out - expected) as usize;
            let keep = out.frames().saturating_sub(surplus);
            out.truncate_frames(keep);
        }
        self.clear();
    }

    /// Discards all buffered state, as after a seek.
    pub fn clear(&mut self) {
        self.input.clear();
        self.mid_buffer.fill(0.0);
        self.reference.fill(0.0);
        self.skip_fract = 0.0;
        self.is_beginning = true;
        self.frames_in = 0;
        self.frames_out = 0;
    }

    fn process_sequences(&mut self, out: &mut SampleFifo) {
        let nc = self.params.channels;
        let ovl = self.params.overlap_frames;
        let seq = self.params.sequence_frames;
        let required = self.params.frames_required();

        while self.input.frames() >= required {
            let input = self.input.as_slice();

            let offset = if self.is_beginning {
                // Cross-fading the first overlap onto itself passes it through.
                self.mid_buffer.copy_from_slice(&input[..ovl * nc]);
                0
            } else {
                prepare_reference(&self.mid_buffer, &mut self.reference, nc);
                seek_best_overlap(&self.params, &self.reference, input, &mut self.planner)
            };

            // Cross-fade previous tail into the new sequence's head.
            let head = &input[offset * nc..(offset + ovl) * nc];
            for i in 0..ovl {
                let fade_in = i as f32 / ovl as f32;
                let fade_out = 1.0 - fade_in;
                for ch in 0..nc {
                    let k = i * nc + ch;
                    self.crossfade[k] = self.mid_buffer[k] * fade_out + head[k] * fade_in;
                }
            }
            out.put(&self.crossfade);

            // Body between the two overlaps is copied as-is.
            out.put(&input[(offset + ovl) * nc..(offset + seq - ovl) * nc]);

            self.mid_buffer
                .copy_from_slice(&input[(offset + seq - ovl) * nc..(offset + seq) * nc]);

            self.frames_out += (seq - ovl) as u64;
            self.is_beginning = false;

            self.skip_fract += self.params.nominal_skip();
            let skip = self.skip_fract.floor();
            self.skip_fract -= skip;
            self.input.consume(skip as usize);
        }
    }
}

/// Weights the overlap by `i * (overlap - i)` so the search favours matches
/// in the middle of the cross-fade.
fn prepare_reference(mid: &[f32], reference: &mut [f32], channels: usize) {
    let ovl = mid.len() / channels;
    for i in 0..ovl {
        let weight = (i * (ovl - i)) as f32;
        for ch in 0..channels {
            reference[i * channels + ch] = mid[i * channels + ch] * weight;
        }
    }
}

/// Picks the offset in `[0, seek_frames)` whose leading overlap correlates
/// best with `reference`.
fn seek_best_overlap(
    params: &WsolaParams,
    reference: &[f32],
    input: &[f32],
    planner: &mut FftPlanner<f32>,
) -> usize {
    if params.seek_frames <= 1 {
        return 0;
    }
    if params.quick_seek {
        seek_quick(params, reference, input)
    } else if params.seek_frames > FFT_CANDIDATE_THRESHOLD
        && params.overlap_frames >= FFT_OVERLAP_THRESHOLD
    {
        seek_fft(params, reference, input, planner)
    } else {
        seek_direct(params, reference, input)
    }
}

/// Normalized correlation of `reference` against the candidate at `offset`.
#[inline]
fn correlation_at(params: &WsolaParams, reference: &[f32], input: &[f32], offset: usize) -> f64 {
    let nc = params.channels;
    let candidate = &input[offset * nc..offset * nc + reference.len()];
    let mut corr = 0.0f64;
    let mut energy = 0.0f64;
    for (&r, &c) in reference.iter().zip(candidate.iter()) {
        corr += r as f64 * c as f64;
        energy += c as f64 * c as f64;
    }
    if energy < ENERGY_EPSILON {
        return 0.0;
    }
    corr / energy.sqrt()
}

/// Exhaustive time-domain search.
fn seek_direct(params: &WsolaParams, reference: &[f32], input: &[f32]) -> usize {
    let mut best_pos = 0;
    let mut best_corr = f64::NEG_INFINITY;
    for pos in 0..params.seek_frames {
        let corr = correlation_at(params, reference, input, pos);
        if corr > best_corr {
            best_corr = corr;
            best_pos = pos;
        }
    }
    best_pos
}

/// Coarse scan at a fixed stride, then binary refinement around the winner.
fn seek_quick(params: &WsolaParams, reference: &[f32], input: &[f32]) -> usize {
    let mut best_pos = 0;
    let mut best_corr = f64::NEG_INFINITY;
    for pos in (0..params.seek_frames).step_by(QUICK_SEEK_STRIDE) {
        let corr = correlation_at(params, reference, input, pos);
        if corr > best_corr {
            best_corr = corr;
            best_pos = pos;
        }
    }

    let mut step = QUICK_SEEK_STRIDE / 2;
    while step > 0 {
        let center = best_pos;
        let candidates = [center.checked_sub(step), Some(center + step)];
        for pos in candidates.into_iter().flatten() {
            if pos >= params.seek_frames {
                continue;
            }
            let corr = correlation_at(params, reference, input, pos);
            if corr > best_corr {
                best_corr = corr;
                best_pos = pos;
            }
        }
        step /= 2;
    }
    best_pos
}

/// FFT-accelerated exhaustive search.
///
/// Raw cross-correlation is computed per channel in the frequency domain and
/// summed; each lag is then normalized by the candidate's energy taken from
/// a prefix sum over frames.
fn seek_fft(
    params: &WsolaParams,
    reference: &[f32],
    input: &[f32],
    planner: &mut FftPlanner<f32>,
) -> usize {
    let nc = params.channels;
    let ovl = params.overlap_frames;
    let candidates = params.seek_frames;
    let region_frames = candidates + ovl - 1;
    let fft_size = (region_frames + ovl - 1).next_power_of_two();

    let fft_fwd = planner.plan_fft_forward(fft_size);
    let fft_inv = planner.plan_fft_inverse(fft_size);

    let mut ref_buf = vec![Complex::new(0.0f32, 0.0); fft_size];
    let mut search_buf = vec![Complex::new(0.0f32, 0.0); fft_size];
    let mut raw = vec![0.0f64; candidates];
    let norm = 1.0 / fft_size as f64;

    for ch in 0..nc {
        for v in ref_buf.iter_mut() {
            *v = Complex::new(0.0, 0.0);
        }
        for v in search_buf.iter_mut() {
            *v = Complex::new(0.0, 0.0);
        }
        for i in 0..ovl {
            ref_buf[i] = Complex::new(reference[i * nc + ch], 0.0);
        }
        for i in 0..region_frames {
            search_buf[i] = Complex::new(input[i * nc + ch], 0.0);
        }

        // Forward FFT, multiply conj(Ref) * Search, inverse FFT
        fft_fwd.process(&mut ref_buf);
        fft_fwd.process(&mut search_buf);
        for (s, r) in search_buf.iter_mut().zip(ref_buf.iter()) {
            *s = r.conj() * *s;
        }
        fft_inv.process(&mut search_buf);

        for (lag, acc) in raw.iter_mut().enumerate() {
            *acc += search_buf[lag].re as f64 * norm;
        }
    }

    // Running energy of candidate windows via prefix sums
    let mut prefix = vec![0.0f64; region_frames + 1];
    for f in 0..region_frames {
        let frame_energy: f64 = input[f * nc..(f + 1) * nc]
            .iter()
            .map(|&s| s as f64 * s as f64)
            .sum();
        prefix[f + 1] = prefix[f] + frame_energy;
    }

    let mut best_pos = 0;
    let mut best_corr = f64::NEG_INFINITY;
    for (lag, &corr) in raw.iter().enumerate() {
        let energy = prefix[lag + ovl] - prefix[lag];
        let score = if energy < ENERGY_EPSILON {
            0.0
        } else {
            corr / energy.sqrt()
        };
        if score > best_corr {
            best_corr = score;
            best_pos = lag;
        }
    }
    best_pos
}
