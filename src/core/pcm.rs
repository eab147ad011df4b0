//! Interleaved PCM byte buffer with format metadata and time mapping.

use crate::core::types::{AudioFormat, SampleKind, MICROS_PER_SEC};
use crate::error::EngineError;

/// Growable buffer of interleaved PCM frames.
///
/// The byte length is always a whole number of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    format: AudioFormat,
    data: Vec<u8>,
}

impl PcmBuffer {
    /// Creates an empty buffer for `format`.
    pub fn new(format: AudioFormat) -> Result<Self, EngineError> {
        format.validate()?;
        Ok(Self {
            format,
            data: Vec::new(),
        })
    }

    /// Wraps bytes produced by a decoder.
    ///
    /// # Errors
    /// [`EngineError::UnsupportedFormat`] for an invalid format,
    /// [`EngineError::Alignment`] when `bytes` holds a partial frame.
    pub fn from_decoded(format: AudioFormat, bytes: Vec<u8>) -> Result<Self, EngineError> {
        format.validate()?;
        check_alignment(bytes.len(), format.frame_size())?;
        Ok(Self {
            format,
            data: bytes,
        })
    }

    /// Encodes normalized float samples into a new buffer.
    pub fn from_samples(format: AudioFormat, samples: &[f32]) -> Result<Self, EngineError> {
        let mut buffer = Self::new(format)?;
        buffer.append_samples(samples)?;
        Ok(buffer)
    }

    #[inline]
    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of individual samples across all channels.
    #[inline]
    pub fn sample_count(&self) -> usize {
        self.data.len() / self.format.bytes_per_sample()
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.data.len() / self.format.frame_size()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.sample_count() as f64
            / (self.format.sample_rate as f64 * self.format.channel_count as f64)
    }

    /// Duration in microseconds, rounded to the nearest microsecond.
    pub fn duration_us(&self) -> i64 {
        let samples_per_sec = self.samples_per_second() as i128;
        let us = (self.sample_count() as i128 * MICROS_PER_SEC as i128 + samples_per_sec / 2)
            / samples_per_sec;
        us as i64
    }

    /// Appends raw interleaved bytes.
    ///
    /// # Errors
    /// [`EngineError::Alignment`] if the result would end mid-frame; the
    /// buffer is left untouched in that case.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        check_alignment(self.data.len() + bytes.len(), self.format.frame_size())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Appends normalized float samples, saturating to the integer range.
    ///
    /// Values are truncated toward zero after scaling; no dithering.
    pub fn append_samples(&mut self, samples: &[f32]) -> Result<(), EngineError> {
        let channels = self.format.channel_count as usize;
        if samples.len() % channels != 0 {
            return Err(EngineError::Alignment {
                len: samples.len() * self.format.bytes_per_sample(),
                frame_size: self.format.frame_size(),
            });
        }
        self.data
            .reserve(samples.len() * self.format.bytes_per_sample());
        for &s in samples {
            encode_sample(&self.format, s, &mut self.data);
        }
        Ok(())
    }

    /// Interleaves two planar channels of raw samples onto a stereo buffer.
    ///
    /// # Errors
    /// [`EngineError::UnsupportedFormat`] if the buffer is not stereo,
    /// [`EngineError::Alignment`] if the channels differ in length or end
    /// mid-sample. The buffer is left untouched on error.
    pub fn append_stereo(&mut self, left: &[u8], right: &[u8]) -> Result<(), EngineError> {
        if self.format.channel_count != 2 {
            return Err(EngineError::UnsupportedFormat(format!(
                "cannot append stereo samples to a {}-channel buffer",
                self.format.channel_count
            )));
        }
        let bps = self.format.bytes_per_sample();
        if left.len() != right.len() || left.len() % bps != 0 {
            return Err(EngineError::Alignment {
                len: left.len() + right.len(),
                frame_size: self.format.frame_size(),
            });
        }
        self.data.reserve(left.len() * 2);
        for (l, r) in left.chunks_exact(bps).zip(right.chunks_exact(bps)) {
            self.data.extend_from_slice(l);
            self.data.extend_from_slice(r);
        }
        Ok(())
    }

    /// Concatenates another buffer of the same format.
    pub fn extend_from(&mut self, other: &PcmBuffer) -> Result<(), EngineError> {
        if other.format != self.format {
            return Err(EngineError::UnsupportedFormat(format!(
                "cannot concatenate {:?} onto {:?}",
                other.format, self.format
            )));
        }
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    /// Maps an original-time offset to a frame-aligned byte offset.
    ///
    /// `floor(time_us / 1e6 * sample_rate * channels) * bytes_per_sample`,
    /// rounded down to a frame boundary and clamped to `[0, len]`.
    pub fn time_to_byte_offset(&self, time_us: i64) -> usize {
        if time_us <= 0 {
            return 0;
        }
        let channels = self.format.channel_count as i128;
        let samples = time_us as i128 * self.samples_per_second() as i128 / MICROS_PER_SEC as i128;
        let frame_samples = samples - samples % channels;
        let offset = frame_samples * self.format.bytes_per_sample() as i128;
        offset.min(self.data.len() as i128) as usize
    }

    /// Inverse of [`time_to_byte_offset`](Self::time_to_byte_offset).
    ///
    /// Rounds up so that mapping the result forward again lands on the same
    /// frame for any frame-aligned offset.
    pub fn byte_offset_to_time(&self, byte_offset: usize) -> i64 {
        let samples = (byte_offset / self.format.bytes_per_sample()) as i128;
        let per_sec = self.samples_per_second() as i128;
        let us = (samples * MICROS_PER_SEC as i128 + per_sec - 1) / per_sec;
        us as i64
    }

    /// Decodes `count` samples starting at sample index `offset_samples`
    /// into normalized floats. Short reads at the end are truncated.
    pub fn sample_window(&self, offset_samples: usize, count: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(count);
        self.read_samples_into(offset_samples, count, &mut out);
        out
    }

    /// Like [`sample_window`](Self::sample_window) but appends into `out`.
    /// Returns the number of samples decoded.
    pub fn read_samples_into(&self, offset_samples: usize, count: usize, out: &mut Vec<f32>) -> usize {
        let bps = self.format.bytes_per_sample();
        let total = self.sample_count();
        if offset_samples >= total {
            return 0;
        }
        let n = count.min(total - offset_samples);
        let start = offset_samples * bps;
        for chunk in self.data[start..start + n * bps].chunks_exact(bps) {
            out.push(decode_sample(&self.format, chunk));
        }
        n
    }

    /// Copies the frame-aligned byte range `[start, end)` into a new buffer.
    pub fn slice_bytes(&self, start: usize, end: usize) -> PcmBuffer {
        let frame = self.format.frame_size();
        let end = end.min(self.data.len());
        let end = end - end % frame;
        let start = (start - start % frame).min(end);
        PcmBuffer {
            format: self.format,
            data: self.data[start..end].to_vec(),
        }
    }

    /// Copies the region between two times (microseconds).
    pub fn slice_time(&self, start_us: i64, end_us: i64) -> PcmBuffer {
        self.slice_bytes(
            self.time_to_byte_offset(start_us),
            self.time_to_byte_offset(end_us),
        )
    }

    /// Returns a copy with leading and trailing frames removed while every
    /// channel stays at or below `threshold` (normalized amplitude).
    pub fn trim_silence(&self, threshold: f32) -> PcmBuffer {
        let channels = self.format.channel_count as usize;
        let frames = self.frame_count();
        let loud = |frame: usize| {
            self.sample_window(frame * channels, channels)
                .iter()
                .any(|s| s.abs() > threshold)
        };
        let first = (0..frames).find(|&f| loud(f));
        match first {
            None => PcmBuffer {
                format: self.format,
                data: Vec::new(),
            },
            Some(first) => {
                let last = (first..frames).rev().find(|&f| loud(f)).unwrap_or(first);
                let frame = self.format.frame_size();
                self.slice_bytes(first * frame, (last + 1) * frame)
            }
        }
    }

    #[inline]
    fn samples_per_second(&self) -> u64 {
        self.format.sample_rate as u64 * self.format.channel_count as u64
    }
}

fn check_alignment(len: usize, frame_size: usize) -> Result<(), EngineError> {
    if len % frame_size != 0 {
        return Err(EngineError::Alignment { len, frame_size });
    }
    Ok(())
}

/// Full-scale magnitude of an integer sample of `bits` width.
#[inline]
fn full_scale(bits: u16) -> f64 {
    (1u64 << (bits - 1)) as f64
}

/// Decodes one little-endian sample word into a normalized float.
#[inline]
pub(crate) fn decode_sample(format: &AudioFormat, bytes: &[u8]) -> f32 {
    match format.sample_kind {
        SampleKind::Float => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        kind => {
            let bits = format.bits_per_sample;
            let mut raw: u32 = 0;
            for (i, &b) in bytes.iter().enumerate() {
                raw |= (b as u32) << (8 * i);
            }
            let scale = full_scale(bits);
            let value = if kind == SampleKind::Signed {
                // Sign extend from the word width.
                let shift = 32 - bits as u32;
                ((raw << shift) as i32 >> shift) as f64
            } else {
                raw as f64 - scale
            };
            (value / scale) as f32
        }
    }
}

/// Encodes one normalized float, saturating to the integer range.
#[inline]
pub(crate) fn encode_sample(format: &AudioFormat, value: f32, out: &mut Vec<u8>) {
    match format.sample_kind {
        SampleKind::Float => out.extend_from_slice(&value.to_le_bytes()),
        kind => {
            let bits = format.bits_per_sample;
            let scale = full_scale(bits);
            let scaled = (value as f64 * scale).clamp(-scale, scale - 1.0) as i64;
            let word = if kind == SampleKind::Signed {
                scaled as u64
            } else {
                (scaled + scale as i64) as u64
            };
            let bytes = word.to_le_bytes();
            out.extend_from_slice(&bytes[..bits as usize / 8]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo16() -> AudioFormat {
        AudioFormat::pcm16(2, 44100)
    }

    #[test]
    fn test_from_decoded_rejects_bad_format() {
        let bad = AudioFormat {
            channel_count: 0,
            ..stereo16()
        };
        assert!(matches!(
            PcmBuffer::from_decoded(bad, vec![]),
            Err(EngineError::UnsupportedFormat(_))
        ));
        let bad_bits = AudioFormat {
            bits_per_sample: 20,
            ..stereo16()
        };
        assert!(PcmBuffer::from_decoded(bad_bits, vec![]).is_err());
    }

    #[test]
    fn test_append_alignment() {
        let mut buf = PcmBuffer::new(stereo16()).unwrap();
        assert!(buf.append(&[0, 0, 0, 0]).is_ok());
        let err = buf.append(&[0, 0, 0]).unwrap_err();
        assert_eq!(err, EngineError::Alignment { len: 7, frame_size: 4 });
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_derived_sizes() {
        let buf = PcmBuffer::from_decoded(stereo16(), vec![0u8; 44100 * 4]).unwrap();
        assert_eq!(buf.sample_count(), 88200);
        assert_eq!(buf.frame_count(), 44100);
        assert!((buf.duration_seconds() - 1.0).abs() < 1e-12);
        assert_eq!(buf.duration_us(), 1_000_000);
    }

    #[test]
    fn test_time_to_byte_offset() {
        let buf = PcmBuffer::from_decoded(stereo16(), vec![0u8; 44100 * 4 * 10]).unwrap();
        assert_eq!(buf.time_to_byte_offset(0), 0);
        assert_eq!(buf.time_to_byte_offset(-5), 0);
        assert_eq!(buf.time_to_byte_offset(1_000_000), 44100 * 4);
        assert_eq!(buf.time_to_byte_offset(2_000_000), 2 * 44100 * 4);
        // Clamped to the buffer length.
        assert_eq!(buf.time_to_byte_offset(60_000_000), buf.len());
        // Always frame aligned.
        for t in [1, 17, 22, 23, 1001, 123_457] {
            assert_eq!(buf.time_to_byte_offset(t) % 4, 0);
        }
    }

    #[test]
    fn test_offset_time_round_trip_within_one_frame() {
        let buf = PcmBuffer::from_decoded(stereo16(), vec![0u8; 48_000 * 4]).unwrap();
        for frame in [0usize, 1, 2, 3, 99, 4410, 12345, 47_999] {
            let b = frame * 4;
            let back = buf.time_to_byte_offset(buf.byte_offset_to_time(b));
            assert!(back.abs_diff(b) <= 4, "{} -> {}", b, back);
        }
    }

    #[test]
    fn test_byte_offset_to_time_monotonic() {
        let buf = PcmBuffer::from_decoded(stereo16(), vec![0u8; 4000]).unwrap();
        let mut last = -1;
        for b in (0..4000).step_by(4) {
            let t = buf.byte_offset_to_time(b);
            assert!(t >= last);
            last = t;
        }
    }

    #[test]
    fn test_sample_window_signed16() {
        let mut bytes = Vec::new();
        for v in [0i16, 16384, -32768, 32767] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let buf = PcmBuffer::from_decoded(stereo16(), bytes).unwrap();
        let s = buf.sample_window(0, 4);
        assert_eq!(s[0], 0.0);
        assert_eq!(s[1], 0.5);
        assert_eq!(s[2], -1.0);
        assert!((s[3] - 32767.0 / 32768.0).abs() < 1e-7);
        // Short read at the end.
        assert_eq!(buf.sample_window(3, 10).len(), 1);
        assert!(buf.sample_window(4, 10).is_empty());
    }

    #[test]
    fn test_unsigned8_and_signed24_decode() {
        let u8fmt = AudioFormat::new(1, 8000, 8, SampleKind::Unsigned).unwrap();
        let buf = PcmBuffer::from_decoded(u8fmt, vec![0, 128, 255]).unwrap();
        assert_eq!(buf.sample_window(0, 3), vec![-1.0, 0.0, 127.0 / 128.0]);

        let s24 = AudioFormat::new(1, 8000, 24, SampleKind::Signed).unwrap();
        let buf = PcmBuffer::from_decoded(s24, vec![0x00, 0x00, 0x80, 0xFF, 0xFF, 0x7F]).unwrap();
        let s = buf.sample_window(0, 2);
        assert_eq!(s[0], -1.0);
        assert!((s[1] - 8_388_607.0 / 8_388_608.0).abs() < 1e-7);
    }

    #[test]
    fn test_append_samples_saturates() {
        let mut buf = PcmBuffer::new(AudioFormat::pcm16(1, 8000)).unwrap();
        buf.append_samples(&[2.0, -2.0, 0.5]).unwrap();
        let mut expected = Vec::new();
        for v in [32767i16, -32768, 16384] {
            expected.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(buf.bytes(), expected.as_slice());
    }

    #[test]
    fn test_append_samples_partial_frame_rejected() {
        let mut buf = PcmBuffer::new(stereo16()).unwrap();
        assert!(buf.append_samples(&[0.1, 0.2, 0.3]).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_decode_exact_for_integer_widths() {
        for (bits, kind) in [
            (8, SampleKind::Unsigned),
            (8, SampleKind::Signed),
            (16, SampleKind::Signed),
            (16, SampleKind::Unsigned),
            (24, SampleKind::Signed),
        ] {
            let format = AudioFormat::new(1, 8000, bits, kind).unwrap();
            let bytes: Vec<u8> = (0..(bits as usize / 8) * 64).map(|i| (i * 37 % 251) as u8).collect();
            let buf = PcmBuffer::from_decoded(format, bytes).unwrap();
            let floats = buf.sample_window(0, buf.sample_count());
            let again = PcmBuffer::from_samples(format, &floats).unwrap();
            assert_eq!(again.bytes(), buf.bytes(), "{} bit {:?}", bits, kind);
        }
    }

    #[test]
    fn test_extend_from_requires_same_format() {
        let mut a = PcmBuffer::from_decoded(stereo16(), vec![1, 2, 3, 4]).unwrap();
        let b = PcmBuffer::from_decoded(stereo16(), vec![5, 6, 7, 8]).unwrap();
        a.extend_from(&b).unwrap();
        assert_eq!(a.bytes(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        let mono = PcmBuffer::from_decoded(AudioFormat::pcm16(1, 44100), vec![0, 0]).unwrap();
        assert!(a.extend_from(&mono).is_err());
    }

    #[test]
    fn test_slice_time_and_trim() {
        let format = AudioFormat::pcm16(1, 1000);
        let mut samples = vec![0.0f32; 1000];
        for s in samples.iter_mut().skip(200).take(300) {
            *s = 0.5;
        }
        let buf = PcmBuffer::from_samples(format, &samples).unwrap();
        let slice = buf.slice_time(100_000, 300_000);
        assert_eq!(slice.frame_count(), 200);

        let trimmed = buf.trim_silence(0.01);
        assert_eq!(trimmed.frame_count(), 300);
        let silent = PcmBuffer::from_samples(format, &[0.0; 10]).unwrap();
        assert!(silent.trim_silence(0.01).is_empty());
    }

    #[test]
    fn test_append_stereo_interleaves() {
        let mut buf = PcmBuffer::new(stereo16()).unwrap();
        buf.append_stereo(&[1, 2, 3, 4], &[5, 6, 7, 8]).unwrap();
        assert_eq!(buf.bytes(), &[1, 2, 5, 6, 3, 4, 7, 8]);
        assert_eq!(buf.frame_count(), 2);
    }

    #[test]
    fn test_append_stereo_rejects_mismatch() {
        let mut buf = PcmBuffer::new(stereo16()).unwrap();
        assert_eq!(
            buf.append_stereo(&[1, 2, 3, 4], &[5, 6]),
            Err(EngineError::Alignment { len: 6, frame_size: 4 })
        );
        assert!(matches!(
            buf.append_stereo(&[1, 2, 3], &[4, 5, 6]),
            Err(EngineError::Alignment { .. })
        ));
        assert!(buf.is_empty());

        let mut mono = PcmBuffer::new(AudioFormat::pcm16(1, 8000)).unwrap();
        assert!(matches!(
            mono.append_stereo(&[0, 0], &[0, 0]),
            Err(EngineError::UnsupportedFormat(_))
        ));
        assert!(mono.is_empty());
    }
}
