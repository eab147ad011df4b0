//! Error types for the tempokit crate.

use std::fmt;

/// Errors surfaced by buffers, the stretch pipeline, file I/O and the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// File extension is not one of the recognised audio containers.
    UnsupportedExtension(String),
    /// Container header or chunk layout is malformed, or the data is truncated.
    CorruptFile(String),
    /// Compressed stream could not be decoded.
    Decode(String),
    /// Channel count, bit depth or sample kind is not supported.
    UnsupportedFormat(String),
    /// Byte length is not a whole number of frames.
    Alignment { len: usize, frame_size: usize },
    /// Audio output device failure.
    Sink(String),
    /// Caller-supplied parameter is out of range.
    InvalidParameter(String),
    /// Configuration could not be parsed or is inconsistent.
    Config(String),
    /// I/O error.
    Io(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::UnsupportedExtension(ext) => {
                write!(f, "unsupported file extension: {:?}", ext)
            }
            EngineError::CorruptFile(msg) => write!(f, "corrupt file: {}", msg),
            EngineError::Decode(msg) => write!(f, "decode error: {}", msg),
            EngineError::UnsupportedFormat(msg) => write!(f, "unsupported format: {}", msg),
            EngineError::Alignment { len, frame_size } => write!(
                f,
                "buffer length {} is not a multiple of the frame size {}",
                len, frame_size
            ),
            EngineError::Sink(msg) => write!(f, "audio sink error: {}", msg),
            EngineError::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
            EngineError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            EngineError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = EngineError::Alignment {
            len: 7,
            frame_size: 4,
        };
        assert_eq!(
            err.to_string(),
            "buffer length 7 is not a multiple of the frame size 4"
        );
        assert_eq!(
            EngineError::UnsupportedExtension("ogg".into()).to_string(),
            "unsupported file extension: \"ogg\""
        );
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.wav");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(ref m) if m.contains("missing.wav")));
    }
}
