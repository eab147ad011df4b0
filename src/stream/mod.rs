//! Block-streaming tempo/pitch processing.

pub mod pipeline;
pub mod processor;

pub use pipeline::{TimeStretchProcessor, DEFAULT_CHUNK_FRAMES};
pub use processor::StreamProcessor;
