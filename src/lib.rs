#![forbid(unsafe_code)]
//! Audio playback core with independent tempo and pitch control.
//!
//! `tempokit` decodes WAV or MP3 sources into an in-memory [`PcmBuffer`],
//! renders tempo and pitch changes with a WSOLA time stretcher and a rate
//! transposer, and drives an [`AudioSink`] from an [`Engine`] state machine
//! that reports its progress to observers in original-time.
//!
//! # Offline rendering
//!
//! ```
//! use tempokit::{AudioFormat, PcmBuffer, StretchParameters, TimeStretchProcessor};
//!
//! // 1 second of 440 Hz sine, 16-bit mono at 8 kHz
//! let samples: Vec<f32> = (0..8000)
//!     .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 8000.0).sin())
//!     .collect();
//! let input = PcmBuffer::from_samples(AudioFormat::pcm16(1, 8000), &samples).unwrap();
//!
//! // +100% tempo halves the duration
//! let output = TimeStretchProcessor::default()
//!     .process(&input, StretchParameters::new(100.0, 0))
//!     .unwrap();
//! assert_eq!(output.frame_count(), 4000);
//! ```
//!
//! # Playback
//!
//! ```no_run
//! use tempokit::{Engine, EngineEvent, StretchParameters, VirtualDevice};
//! use std::time::Duration;
//!
//! let device = VirtualDevice::new();
//! let mut engine = Engine::new(device.factory());
//! engine.subscribe(|event: &EngineEvent| println!("{:?}", event));
//!
//! engine.load("loop.wav").unwrap();
//! engine.play(StretchParameters::new(25.0, -2)).unwrap();
//! device.advance(Duration::from_millis(500));
//! engine.process_sink_events();
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod playback;
pub mod stream;
pub mod stretch;

pub use config::EngineConfig;
pub use core::pcm::PcmBuffer;
pub use core::types::{
    AudioFormat, PlaybackState, PlaybackWindow, Position, SampleKind, StretchParameters,
    MICROS_PER_SEC,
};
pub use error::EngineError;
pub use io::{decode_file, DefaultDecoder, Decoder, FileKind};
pub use playback::{
    AudioSink, ChannelObserver, Engine, EngineEvent, Observer, PlaybackClock, SinkEvent,
    SinkEventSender, SinkFactory, SinkGuard, SinkState, SubscriptionId, VirtualDevice,
    VirtualSink,
};
#[cfg(feature = "device")]
pub use playback::DeviceSink;
pub use stream::{StreamProcessor, TimeStretchProcessor, DEFAULT_CHUNK_FRAMES};
pub use stretch::StretchSettings;
