//! MP3 decoding via symphonia, streamed packet by packet into a [`PcmBuffer`].

use crate::core::pcm::PcmBuffer;
use crate::core::types::{AudioFormat, SampleKind};
use crate::error::EngineError;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decodes an MP3 file from disk.
pub fn decode_mp3_file(path: &Path) -> Result<PcmBuffer, EngineError> {
    let file = File::open(path)
        .map_err(|e| EngineError::Io(format!("{}: {}", path.display(), e)))?;
    decode_media(Box::new(file))
}

/// Decodes an MP3 stream held in memory.
pub fn decode_mp3(data: Vec<u8>) -> Result<PcmBuffer, EngineError> {
    decode_media(Box::new(Cursor::new(data)))
}

fn decode_media(source: Box<dyn MediaSource>) -> Result<PcmBuffer, EngineError> {
    let mss = MediaSourceStream::new(source, Default::default());
    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let detected = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| EngineError::Decode(format!("unrecognized mp3 stream: {}", e)))?;
    let mut reader = detected.format;

    let track = reader
        .default_track()
        .ok_or_else(|| EngineError::Decode("no audio track found".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| EngineError::Decode(format!("failed to create decoder: {}", e)))?;

    let mut pcm: Option<PcmBuffer> = None;
    let mut skipped = 0usize;

    loop {
        let packet = match reader.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(EngineError::Decode(format!("error reading packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                skipped += 1;
                log::debug!("skipping undecodable packet: {}", msg);
                continue;
            }
            Err(e) => return Err(EngineError::Decode(format!("decode error: {}", e))),
        };

        append_decoded(decoded, &mut pcm)?;
    }

    if skipped > 0 {
        log::warn!("skipped {} corrupt MP3 packet(s)", skipped);
    }

    pcm.filter(|b| !b.is_empty())
        .ok_or_else(|| EngineError::Decode("stream contains no audio frames".to_string()))
}

/// Output width for a decoded buffer: integer formats keep theirs, float
/// formats become signed 16-bit.
fn target_width(decoded: &AudioBufferRef<'_>) -> (u16, SampleKind) {
    match decoded {
        AudioBufferRef::U8(_) => (8, SampleKind::Unsigned),
        AudioBufferRef::S16(_) => (16, SampleKind::Signed),
        AudioBufferRef::S24(_) => (24, SampleKind::Signed),
        AudioBufferRef::S32(_) => (32, SampleKind::Signed),
        _ => (16, SampleKind::Signed),
    }
}

fn append_decoded(
    decoded: AudioBufferRef<'_>,
    pcm: &mut Option<PcmBuffer>,
) -> Result<(), EngineError> {
    if decoded.frames() == 0 {
        return Ok(());
    }
    let spec: SignalSpec = *decoded.spec();
    let channels = spec.channels.count();

    if pcm.is_none() {
        let (bits, kind) = target_width(&decoded);
        let format = AudioFormat::new(channels as u16, spec.rate, bits, kind)?;
        log::debug!(
            "mp3 stream: {} ch, {} Hz, decoding to {}-bit",
            channels,
            spec.rate,
            bits
        );
        *pcm = Some(PcmBuffer::new(format)?);
    }
    let Some(buffer) = pcm.as_mut() else {
        return Ok(());
    };
    if buffer.format().channel_count as usize != channels {
        return Err(EngineError::Decode(format!(
            "channel count changed mid-stream from {} to {}",
            buffer.format().channel_count,
            channels
        )));
    }

    let capacity = decoded.capacity() as u64;
    let mut bytes = Vec::with_capacity(decoded.frames() * buffer.format().frame_size());
    match buffer.format().bits_per_sample {
        8 => {
            let mut sb = SampleBuffer::<u8>::new(capacity, spec);
            sb.copy_interleaved_ref(decoded);
            bytes.extend_from_slice(sb.samples());
        }
        16 => {
            let mut sb = SampleBuffer::<i16>::new(capacity, spec);
            sb.copy_interleaved_ref(decoded);
            for s in sb.samples() {
                bytes.extend_from_slice(&s.to_le_bytes());
            }
        }
        24 => {
            // Converted to full-scale i32; keep the top three bytes.
            let mut sb = SampleBuffer::<i32>::new(capacity, spec);
            sb.copy_interleaved_ref(decoded);
            for s in sb.samples() {
                bytes.extend_from_slice(&(s >> 8).to_le_bytes()[..3]);
            }
        }
        _ => {
            let mut sb = SampleBuffer::<i32>::new(capacity, spec);
            sb.copy_interleaved_ref(decoded);
            for s in sb.samples() {
                bytes.extend_from_slice(&s.to_le_bytes());
            }
        }
    }
    buffer.append(&bytes)
}
