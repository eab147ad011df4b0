//! Audio file formats.

pub mod decoder;
pub mod mp3;
pub mod wav;

pub use decoder::{decode_file, DefaultDecoder, Decoder, FileKind};
