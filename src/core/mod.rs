//! Core types, PCM buffers and the DSP building blocks shared by the pipeline.

pub mod fifo;
pub mod filter;
pub mod pcm;
pub mod resample;
pub mod types;

pub use fifo::SampleFifo;
pub use pcm::PcmBuffer;
pub use types::*;
