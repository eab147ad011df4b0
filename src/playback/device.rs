//! Hardware output through cpal.
//!
//! A feeder thread decodes the shared [`PcmBuffer`] from the read cursor into
//! a lock-free ring buffer; the device callback drains it, applies volume and
//! counts the frames actually played. Progress ticks are derived from that
//! count, so they follow the device clock rather than the feeder.

use crate::core::pcm::PcmBuffer;
use crate::core::types::{AudioFormat, MICROS_PER_SEC};
use crate::error::EngineError;
use crate::playback::sink::{AudioSink, SinkEvent, SinkEventSender, SinkFactory, SinkState};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// Ring buffer capacity in seconds of audio.
const RING_SECONDS: f64 = 0.5;
/// Frames decoded per feeder iteration.
const FEED_CHUNK_FRAMES: usize = 1024;
const FEEDER_SLEEP: Duration = Duration::from_millis(2);

struct Feed {
    stream: Option<Arc<PcmBuffer>>,
    /// Next byte the feeder decodes.
    read_offset: usize,
    /// Byte offset at the last start or seek.
    base_offset: usize,
    /// Bumped on every start or seek so the feeder restarts its tick schedule.
    generation: u64,
}

struct Shared {
    format: AudioFormat,
    active: AtomicBool,
    flush: AtomicBool,
    shutdown: AtomicBool,
    volume_bits: AtomicU32,
    /// Frames played by the device since the last start or seek.
    played_frames: AtomicU64,
    feed: Mutex<Feed>,
}

impl Shared {
    fn feed(&self) -> MutexGuard<'_, Feed> {
        self.feed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn elapsed_us(&self) -> i64 {
        let frames = self.played_frames.load(Ordering::Acquire) as i128;
        (frames * MICROS_PER_SEC as i128 / self.format.sample_rate as i128) as i64
    }

    /// Restarts playback accounting at `offset`.
    fn reposition(&self, offset: usize) {
        let mut feed = self.feed();
        feed.read_offset = offset;
        feed.base_offset = offset;
        feed.generation += 1;
        self.flush.store(true, Ordering::Release);
        self.played_frames.store(0, Ordering::Release);
    }
}

/// [`AudioSink`] playing through the default cpal output device.
pub struct DeviceSink {
    shared: Arc<Shared>,
    events: SinkEventSender,
    feeder: Option<thread::JoinHandle<()>>,
    _stream: Stream,
}

impl DeviceSink {
    /// Opens the default output device with the source's channel count and
    /// sample rate.
    pub fn open(
        format: &AudioFormat,
        events: SinkEventSender,
        notify_interval: Duration,
    ) -> Result<Self, EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::Sink("no audio output device found".to_string()))?;

        let config = StreamConfig {
            channels: format.channel_count,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity =
            (RING_SECONDS * format.sample_rate as f64) as usize * format.channel_count as usize;
        let rb = HeapRb::<f32>::new(capacity.max(FEED_CHUNK_FRAMES * 4));
        let (producer, mut consumer) = rb.split();

        let shared = Arc::new(Shared {
            format: *format,
            active: AtomicBool::new(false),
            flush: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            volume_bits: AtomicU32::new(1.0f32.to_bits()),
            played_frames: AtomicU64::new(0),
            feed: Mutex::new(Feed {
                stream: None,
                read_offset: 0,
                base_offset: 0,
                generation: 0,
            }),
        });

        let channels = format.channel_count as usize;
        let cb_shared = shared.clone();
        let err_events = events.clone();
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if cb_shared.flush.swap(false, Ordering::AcqRel) {
                        consumer.clear();
                    }
                    if !cb_shared.active.load(Ordering::Acquire) {
                        data.fill(0.0);
                        return;
                    }

                    let volume = f32::from_bits(cb_shared.volume_bits.load(Ordering::Relaxed));
                    let read = consumer.pop_slice(data);
                    for sample in &mut data[..read] {
                        *sample *= volume;
                    }
                    data[read..].fill(0.0);
                    cb_shared
                        .played_frames
                        .fetch_add((read / channels) as u64, Ordering::AcqRel);
                },
                move |err| {
                    log::error!("audio output error: {err}");
                    let _ = err_events.send(SinkEvent::StateChanged(SinkState::Error));
                },
                None,
            )
            .map_err(|e| EngineError::Sink(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| EngineError::Sink(format!("failed to start audio stream: {e}")))?;

        let feeder = spawn_feeder(shared.clone(), producer, events.clone(), notify_interval);
        log::debug!(
            "opened output device: {} ch, {} Hz",
            format.channel_count,
            format.sample_rate
        );

        Ok(Self {
            shared,
            events,
            feeder: Some(feeder),
            _stream: stream,
        })
    }

    /// Factory opening a [`DeviceSink`] for every load.
    pub fn factory() -> impl SinkFactory + 'static {
        |format: &AudioFormat,
         events: SinkEventSender,
         notify_interval: Duration|
         -> Result<Box<dyn AudioSink>, EngineError> {
            Ok(Box::new(DeviceSink::open(format, events, notify_interval)?))
        }
    }

    fn send(&self, state: SinkState) {
        let _ = self.events.send(SinkEvent::StateChanged(state));
    }
}

fn spawn_feeder(
    shared: Arc<Shared>,
    mut producer: HeapProd<f32>,
    events: SinkEventSender,
    notify_interval: Duration,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let interval_us = (notify_interval.as_micros() as i64).max(1);
        let channels = shared.format.channel_count as usize;
        let bytes_per_sample = shared.format.bytes_per_sample();
        let mut chunk = Vec::with_capacity(FEED_CHUNK_FRAMES * channels);
        let mut generation = u64::MAX;
        let mut next_tick_us = interval_us;
        let mut drained = false;

        while !shared.shutdown.load(Ordering::Acquire) {
            {
                let mut feed = shared.feed();
                if feed.generation != generation {
                    generation = feed.generation;
                    next_tick_us = interval_us;
                    drained = false;
                }

                // Wait for the callback to drop stale samples before refilling.
                if !shared.flush.load(Ordering::Acquire) {
                    if let Some(stream) = feed.stream.clone() {
                        while producer.vacant_len() >= FEED_CHUNK_FRAMES * channels
                            && feed.read_offset < stream.len()
                        {
                            chunk.clear();
                            let n = stream.read_samples_into(
                                feed.read_offset / bytes_per_sample,
                                FEED_CHUNK_FRAMES * channels,
                                &mut chunk,
                            );
                            feed.read_offset += n * bytes_per_sample;
                            let mut pushed = 0;
                            while pushed < chunk.len() {
                                pushed += producer.push_slice(&chunk[pushed..]);
                            }
                        }

                        if shared.active.load(Ordering::Acquire) {
                            let elapsed = shared.elapsed_us();
                            if elapsed >= next_tick_us {
                                let _ = events.send(SinkEvent::Progress(elapsed));
                                while next_tick_us <= elapsed {
                                    next_tick_us += interval_us;
                                }
                            }
                            if !drained
                                && feed.read_offset >= stream.len()
                                && producer.occupied_len() == 0
                            {
                                drained = true;
                                shared.active.store(false, Ordering::Release);
                                let _ = events.send(SinkEvent::Progress(elapsed));
                                let _ = events.send(SinkEvent::StateChanged(SinkState::Idle));
                            }
                        }
                    }
                }
            }
            thread::sleep(FEEDER_SLEEP);
        }
    })
}

impl AudioSink for DeviceSink {
    fn start(&mut self, stream: Arc<PcmBuffer>, offset: usize) -> Result<(), EngineError> {
        self.shared.feed().stream = Some(stream);
        self.shared.reposition(offset);
        self.shared.active.store(true, Ordering::Release);
        self.send(SinkState::Active);
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.active.store(false, Ordering::Release);
        self.shared.feed().stream = None;
        self.shared.reposition(0);
        self.send(SinkState::Stopped);
    }

    fn suspend(&mut self) -> Result<(), EngineError> {
        self.shared.active.store(false, Ordering::Release);
        self.send(SinkState::Suspended);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        if self.shared.feed().stream.is_none() {
            return Err(EngineError::Sink("no stream to resume".to_string()));
        }
        self.shared.active.store(true, Ordering::Release);
        self.send(SinkState::Active);
        Ok(())
    }

    fn seek(&mut self, offset: usize) -> Result<(), EngineError> {
        self.shared.reposition(offset);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), EngineError> {
        self.shared
            .volume_bits
            .store(volume.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    fn cursor(&self) -> usize {
        let feed = self.shared.feed();
        let played = self.shared.played_frames.load(Ordering::Acquire) as usize
            * self.shared.format.frame_size();
        let len = feed.stream.as_ref().map(|s| s.len()).unwrap_or(0);
        (feed.base_offset + played).min(len)
    }
}

impl Drop for DeviceSink {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.feeder.take() {
            let _ = handle.join();
        }
    }
}
