//! Playback timeline, audio sinks and the engine that drives them.

pub mod clock;
#[cfg(feature = "device")]
pub mod device;
pub mod engine;
pub mod observer;
pub mod sink;
pub mod virtual_sink;

pub use clock::PlaybackClock;
#[cfg(feature = "device")]
pub use device::DeviceSink;
pub use engine::Engine;
pub use observer::{ChannelObserver, EngineEvent, Observer, SubscriptionId};
pub use sink::{AudioSink, SinkEvent, SinkEventSender, SinkFactory, SinkGuard, SinkState};
pub use virtual_sink::{VirtualDevice, VirtualSink};
