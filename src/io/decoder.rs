//! File-extension keyed decoding into [`PcmBuffer`]s.

use crate::core::pcm::PcmBuffer;
use crate::error::EngineError;
use crate::io::{mp3, wav};
use std::fmt;
use std::path::Path;

/// Recognised audio containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Wav,
    Mp3,
}

impl FileKind {
    /// Matches an extension case-insensitively, without the leading dot.
    pub fn from_extension(ext: &str) -> Result<Self, EngineError> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Ok(FileKind::Wav),
            "mp3" => Ok(FileKind::Mp3),
            _ => Err(EngineError::UnsupportedExtension(ext.to_string())),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        Self::from_extension(ext)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Wav => write!(f, "wav"),
            FileKind::Mp3 => write!(f, "mp3"),
        }
    }
}

/// Turns a file into raw interleaved PCM plus format.
///
/// The engine resolves the [`FileKind`] first; an unrecognised extension
/// never reaches the decoder. Implemented for closures of the same shape.
pub trait Decoder {
    fn decode(&mut self, path: &Path, kind: FileKind) -> Result<PcmBuffer, EngineError>;
}

impl<F> Decoder for F
where
    F: FnMut(&Path, FileKind) -> Result<PcmBuffer, EngineError>,
{
    fn decode(&mut self, path: &Path, kind: FileKind) -> Result<PcmBuffer, EngineError> {
        self(path, kind)
    }
}

/// WAV parsed directly, MP3 through symphonia.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDecoder;

impl Decoder for DefaultDecoder {
    fn decode(&mut self, path: &Path, kind: FileKind) -> Result<PcmBuffer, EngineError> {
        match kind {
            FileKind::Wav => wav::read_wav_file(path),
            FileKind::Mp3 => mp3::decode_mp3_file(path),
        }
    }
}

/// Decodes `path`, picking the container from its extension.
pub fn decode_file(path: &Path) -> Result<PcmBuffer, EngineError> {
    let kind = FileKind::from_path(path)?;
    DefaultDecoder.decode(path, kind)
}
