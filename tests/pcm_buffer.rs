//! Byte/time mapping and framing guarantees of `PcmBuffer`.

mod common;

use tempokit::{AudioFormat, EngineError, PcmBuffer, SampleKind};

#[test]
fn test_time_offset_roundtrip_within_one_frame() {
    let formats = [
        AudioFormat::pcm16(2, 44100),
        AudioFormat::pcm16(1, 8000),
        AudioFormat::new(2, 48000, 24, SampleKind::Signed).unwrap(),
        AudioFormat::new(1, 22050, 8, SampleKind::Unsigned).unwrap(),
    ];
    for format in formats {
        let buffer = PcmBuffer::from_decoded(format, vec![0; format.bytes_per_second() * 2]).unwrap();
        let frame = format.frame_size();
        for time_us in [0i64, 1, 999, 22_676, 500_000, 1_234_567, 1_999_999] {
            let offset = buffer.time_to_byte_offset(time_us);
            assert_eq!(offset % frame, 0, "offset {} not frame aligned", offset);
            let back = buffer.byte_offset_to_time(offset);
            let frame_us = 1_000_000 / format.sample_rate as i64 + 1;
            assert!(
                (back - time_us).abs() <= frame_us,
                "{:?}: {} -> {} -> {}",
                format,
                time_us,
                offset,
                back
            );
            assert_eq!(buffer.time_to_byte_offset(back), offset);
        }
    }
}

#[test]
fn test_offsets_clamp_to_buffer() {
    let buffer = common::sine_buffer(440.0, 8000, 0.5);
    assert_eq!(buffer.time_to_byte_offset(-5), 0);
    assert_eq!(buffer.time_to_byte_offset(10_000_000), buffer.len());
    assert_eq!(buffer.duration_us(), 500_000);
}

#[test]
fn test_misaligned_input_is_rejected() {
    let format = AudioFormat::pcm16(2, 44100);
    assert_eq!(
        PcmBuffer::from_decoded(format, vec![0; 6]),
        Err(EngineError::Alignment {
            len: 6,
            frame_size: 4
        })
    );

    let mut buffer = PcmBuffer::from_decoded(format, vec![0; 8]).unwrap();
    assert!(matches!(
        buffer.append(&[1, 2, 3]),
        Err(EngineError::Alignment { .. })
    ));
    assert_eq!(buffer.len(), 8);
    assert!(buffer.append_samples(&[0.1, 0.2, 0.3]).is_err());
    buffer.append(&[1, 2, 3, 4]).unwrap();
    assert_eq!(buffer.frame_count(), 3);
}

#[test]
fn test_unsupported_formats() {
    assert!(matches!(
        AudioFormat::new(0, 44100, 16, SampleKind::Signed),
        Err(EngineError::UnsupportedFormat(_))
    ));
    assert!(AudioFormat::new(1, 44100, 12, SampleKind::Signed).is_err());
    assert!(AudioFormat::new(1, 44100, 16, SampleKind::Float).is_err());
    assert!(AudioFormat::new(1, 0, 16, SampleKind::Signed).is_err());
}

#[test]
fn test_samples_saturate() {
    let buffer = PcmBuffer::from_samples(AudioFormat::pcm16(1, 8000), &[2.0, -2.0, 0.0]).unwrap();
    let bytes = buffer.bytes();
    assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
    assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MIN);
    assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), 0);
}

#[test]
fn test_slice_time_and_trim() {
    let buffer = common::stereo_buffer(8000, 1.0);
    let slice = buffer.slice_time(250_000, 750_000);
    assert_eq!(slice.frame_count(), 4000);
    assert_eq!(slice.format(), buffer.format());

    let mut padded = PcmBuffer::from_decoded(*buffer.format(), vec![0; 400]).unwrap();
    padded.extend_from(&slice).unwrap();
    padded.append(&[0; 400]).unwrap();
    let trimmed = padded.trim_silence(0.001);
    assert!(trimmed.frame_count() <= slice.frame_count());
    assert!(trimmed.frame_count() + 2 >= slice.frame_count());
}
