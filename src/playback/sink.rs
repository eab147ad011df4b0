//! Audio output abstraction consumed by the engine.
//!
//! A sink pulls bytes from a shared [`PcmBuffer`] at its own cadence and
//! reports back through a [`SinkEventSender`]. Events are queued rather than
//! delivered as callbacks so the engine handles them on its owner thread.

use crate::core::pcm::PcmBuffer;
use crate::core::types::AudioFormat;
use crate::error::EngineError;
use std::ops::{Deref, DerefMut};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

/// Device-level state reported by a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Consuming the stream.
    Active,
    /// Paused with the cursor kept.
    Suspended,
    /// The stream ran dry.
    Idle,
    Stopped,
    /// Device failure.
    Error,
}

/// Asynchronous sink notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    /// Real-time microseconds played since the last `start` or `seek`.
    Progress(i64),
    StateChanged(SinkState),
}

pub type SinkEventSender = Sender<SinkEvent>;

/// Output device streaming interleaved PCM.
///
/// Byte offsets are positions in the stream handed to [`start`](Self::start)
/// and are frame-aligned by the caller.
pub trait AudioSink {
    /// Begins consuming `stream` at `offset`. Resets the elapsed counter.
    fn start(&mut self, stream: Arc<PcmBuffer>, offset: usize) -> Result<(), EngineError>;

    /// Halts output and releases the stream.
    fn stop(&mut self);

    fn suspend(&mut self) -> Result<(), EngineError>;

    /// Continues after [`suspend`](Self::suspend) or a reported error.
    fn resume(&mut self) -> Result<(), EngineError>;

    /// Moves the read cursor. Resets the elapsed counter.
    fn seek(&mut self, offset: usize) -> Result<(), EngineError>;

    /// Output gain in `(0, 1]`.
    fn set_volume(&mut self, volume: f32) -> Result<(), EngineError>;

    /// Current read cursor in bytes.
    fn cursor(&self) -> usize;
}

/// Opens sinks for a given format.
///
/// Implemented for closures with the same signature as [`open`](Self::open).
pub trait SinkFactory {
    fn open(
        &mut self,
        format: &AudioFormat,
        events: SinkEventSender,
        notify_interval: Duration,
    ) -> Result<Box<dyn AudioSink>, EngineError>;
}

impl<F> SinkFactory for F
where
    F: FnMut(&AudioFormat, SinkEventSender, Duration) -> Result<Box<dyn AudioSink>, EngineError>,
{
    fn open(
        &mut self,
        format: &AudioFormat,
        events: SinkEventSender,
        notify_interval: Duration,
    ) -> Result<Box<dyn AudioSink>, EngineError> {
        self(format, events, notify_interval)
    }
}

/// Owns an open sink and stops it when dropped.
pub struct SinkGuard {
    sink: Box<dyn AudioSink>,
}

impl SinkGuard {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        Self { sink }
    }
}

impl Deref for SinkGuard {
    type Target = dyn AudioSink;

    fn deref(&self) -> &Self::Target {
        self.sink.as_ref()
    }
}

impl DerefMut for SinkGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.sink.as_mut()
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        self.sink.stop();
    }
}
