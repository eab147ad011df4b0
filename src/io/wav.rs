use crate::core::pcm::PcmBuffer;
use crate::core::types::{AudioFormat, SampleKind};
use crate::error::EngineError;
use std::io::{Read, Write};
use std::path::Path;

/// WAV audio format codes.
const WAV_FORMAT_PCM: u16 = 1;
const WAV_FORMAT_IEEE_FLOAT: u16 = 3;

const RIFF_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
const FMT_CHUNK_LEN: usize = 16;

/// Parses a WAV file held in memory.
///
/// Accepts integer PCM (8-bit unsigned, 16/24/32-bit signed) and 32-bit
/// float. Chunks other than `fmt ` and `data` (`fact`, `LIST`, ...) are
/// skipped.
///
/// # Errors
/// [`EngineError::CorruptFile`] when the RIFF/WAVE/fmt/data layout is
/// broken or the data chunk is truncated, [`EngineError::UnsupportedFormat`]
/// for other encodings.
pub fn read_wav(data: &[u8]) -> Result<PcmBuffer, EngineError> {
    if data.len() < RIFF_HEADER_LEN {
        return Err(EngineError::CorruptFile("WAV file too short".to_string()));
    }
    if &data[0..4] != b"RIFF" {
        return Err(EngineError::CorruptFile("missing RIFF header".to_string()));
    }
    if &data[8..12] != b"WAVE" {
        return Err(EngineError::CorruptFile(
            "missing WAVE identifier".to_string(),
        ));
    }

    let mut cursor = RIFF_HEADER_LEN;
    let mut format: Option<AudioFormat> = None;

    while cursor + CHUNK_HEADER_LEN <= data.len() {
        let chunk_id = &data[cursor..cursor + 4];
        let chunk_size = read_u32_le(data, cursor + 4) as usize;
        cursor += CHUNK_HEADER_LEN;

        match chunk_id {
            b"fmt " => {
                if chunk_size < FMT_CHUNK_LEN || cursor + FMT_CHUNK_LEN > data.len() {
                    return Err(EngineError::CorruptFile(
                        "fmt chunk too short".to_string(),
                    ));
                }
                format = Some(parse_fmt(&data[cursor..cursor + FMT_CHUNK_LEN])?);
            }
            b"data" => {
                let format = format.ok_or_else(|| {
                    EngineError::CorruptFile("data chunk precedes fmt chunk".to_string())
                })?;
                let end = cursor.checked_add(chunk_size).filter(|&e| e <= data.len());
                let end = end.ok_or_else(|| {
                    EngineError::CorruptFile(format!(
                        "data chunk declares {} bytes but only {} remain",
                        chunk_size,
                        data.len() - cursor
                    ))
                })?;
                let mut bytes = data[cursor..end].to_vec();
                let partial = bytes.len() % format.frame_size();
                if partial != 0 {
                    log::warn!("dropping {} trailing bytes of a partial frame", partial);
                    bytes.truncate(bytes.len() - partial);
                }
                return PcmBuffer::from_decoded(format, bytes);
            }
            _ => {}
        }

        cursor = cursor.saturating_add(chunk_size);
        // WAV chunks are word-aligned
        if chunk_size % 2 != 0 {
            cursor = cursor.saturating_add(1);
        }
    }

    match format {
        None => Err(EngineError::CorruptFile("no fmt chunk found".to_string())),
        Some(_) => Err(EngineError::CorruptFile("no data chunk found".to_string())),
    }
}

fn parse_fmt(chunk: &[u8]) -> Result<AudioFormat, EngineError> {
    let format_code = read_u16_le(chunk, 0);
    let channels = read_u16_le(chunk, 2);
    let sample_rate = read_u32_le(chunk, 4);
    // skip byte rate (4 bytes) and block align (2 bytes)
    let bits_per_sample = read_u16_le(chunk, 14);

    let kind = match (format_code, bits_per_sample) {
        (WAV_FORMAT_PCM, 8) => SampleKind::Unsigned,
        (WAV_FORMAT_PCM, 16 | 24 | 32) => SampleKind::Signed,
        (WAV_FORMAT_IEEE_FLOAT, 32) => SampleKind::Float,
        (code, bits) => {
            return Err(EngineError::UnsupportedFormat(format!(
                "WAV format code={}, bits={}",
                code, bits
            )))
        }
    };
    AudioFormat::new(channels, sample_rate, bits_per_sample, kind)
}

/// Reads a WAV file from disk.
pub fn read_wav_file(path: &Path) -> Result<PcmBuffer, EngineError> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| EngineError::Io(format!("{}: {}", path.display(), e)))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|e| EngineError::Io(format!("{}: {}", path.display(), e)))?;
    read_wav(&data)
}

/// Serializes a buffer as RIFF header + 16-byte fmt chunk + data chunk.
///
/// Integer buffers are written with format code 1, float with code 3.
pub fn write_wav(buffer: &PcmBuffer) -> Vec<u8> {
    let format = buffer.format();
    let format_code = match format.sample_kind {
        SampleKind::Float => WAV_FORMAT_IEEE_FLOAT,
        SampleKind::Signed | SampleKind::Unsigned => WAV_FORMAT_PCM,
    };
    let byte_rate = format.bytes_per_second() as u32;
    let block_align = format.frame_size() as u16;
    let data_size = buffer.len() as u32;
    let pad = data_size % 2;
    let file_size =
        4 + (CHUNK_HEADER_LEN + FMT_CHUNK_LEN + CHUNK_HEADER_LEN) as u32 + data_size + pad;

    let mut out = Vec::with_capacity(file_size as usize + 8);

    // RIFF header
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&file_size.to_le_bytes());
    out.extend_from_slice(b"WAVE");

    // fmt chunk
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&(FMT_CHUNK_LEN as u32).to_le_bytes());
    out.extend_from_slice(&format_code.to_le_bytes());
    out.extend_from_slice(&format.channel_count.to_le_bytes());
    out.extend_from_slice(&format.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&format.bits_per_sample.to_le_bytes());

    // data chunk
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_size.to_le_bytes());
    out.extend_from_slice(buffer.bytes());
    if pad != 0 {
        out.push(0);
    }

    out
}

/// Writes a WAV file to disk.
pub fn save_wav(path: &Path, buffer: &PcmBuffer) -> Result<(), EngineError> {
    let data = write_wav(buffer);
    let mut file = std::fs::File::create(path)
        .map_err(|e| EngineError::Io(format!("{}: {}", path.display(), e)))?;
    file.write_all(&data)
        .map_err(|e| EngineError::Io(format!("{}: {}", path.display(), e)))?;
    log::info!(
        "wrote {} ({:.3}s, {} bytes)",
        path.display(),
        buffer.duration_seconds(),
        data.len()
    );
    Ok(())
}

#[inline]
fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}
