//! Deterministic in-memory sink.
//!
//! Nothing plays until [`VirtualDevice::advance`] is called, which consumes
//! the stream as a real device would over that much wall-clock time and
//! queues the matching progress and state events. Used for tests and for
//! headless rendering.

use crate::core::pcm::PcmBuffer;
use crate::core::types::{AudioFormat, MICROS_PER_SEC};
use crate::error::EngineError;
use crate::playback::sink::{AudioSink, SinkEvent, SinkEventSender, SinkFactory, SinkState};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

struct DeviceState {
    format: Option<AudioFormat>,
    events: Option<SinkEventSender>,
    notify_interval_us: i64,
    stream: Option<Arc<PcmBuffer>>,
    state: SinkState,
    /// Cursor at the last start or seek, in frames.
    base_frame: usize,
    /// Real-time played since the last start or seek.
    elapsed_us: i64,
    next_tick_us: i64,
    volume: f32,
    frames_played: u64,
    opened: usize,
    started: usize,
    fail_resume: usize,
}

impl DeviceState {
    fn send(&self, event: SinkEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn set_state(&mut self, state: SinkState) {
        if self.state != state {
            self.state = state;
            self.send(SinkEvent::StateChanged(state));
        }
    }

    fn sample_rate(&self) -> i64 {
        self.format.map(|f| f.sample_rate as i64).unwrap_or(1)
    }

    fn frame_size(&self) -> usize {
        self.format.map(|f| f.frame_size()).unwrap_or(1)
    }

    fn frames_at(&self, elapsed_us: i64) -> usize {
        (elapsed_us as i128 * self.sample_rate() as i128 / MICROS_PER_SEC as i128) as usize
    }

    fn total_frames(&self) -> usize {
        self.stream
            .as_ref()
            .map(|s| s.len() / self.frame_size())
            .unwrap_or(0)
    }

    /// Elapsed time at which the stream runs dry.
    fn end_elapsed_us(&self) -> i64 {
        let left = self.total_frames().saturating_sub(self.base_frame) as i128;
        let rate = self.sample_rate() as i128;
        ((left * MICROS_PER_SEC as i128 + rate - 1) / rate) as i64
    }

    fn cursor_frame(&self) -> usize {
        (self.base_frame + self.frames_at(self.elapsed_us)).min(self.total_frames())
    }

    fn reset_elapsed(&mut self, frame: usize) {
        self.base_frame = frame.min(self.total_frames());
        self.elapsed_us = 0;
        self.next_tick_us = self.notify_interval_us;
    }

    fn advance(&mut self, mut remaining_us: i64) {
        if self.state != SinkState::Active || self.stream.is_none() {
            return;
        }
        let end_us = self.end_elapsed_us();
        while self.state == SinkState::Active {
            let step = remaining_us
                .min(self.next_tick_us - self.elapsed_us)
                .min(end_us - self.elapsed_us)
                .max(0);
            let before = self.cursor_frame();
            self.elapsed_us += step;
            remaining_us -= step;
            self.frames_played += (self.cursor_frame() - before) as u64;

            if self.elapsed_us >= end_us {
                self.send(SinkEvent::Progress(self.elapsed_us));
                self.set_state(SinkState::Idle);
                break;
            }
            if self.elapsed_us >= self.next_tick_us {
                self.send(SinkEvent::Progress(self.elapsed_us));
                self.next_tick_us += self.notify_interval_us;
            }
            if remaining_us <= 0 {
                break;
            }
        }
    }
}

/// Shared handle controlling the simulated device.
#[derive(Clone)]
pub struct VirtualDevice {
    shared: Arc<Mutex<DeviceState>>,
}

impl Default for VirtualDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualDevice {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(DeviceState {
                format: None,
                events: None,
                notify_interval_us: 10_000,
                stream: None,
                state: SinkState::Stopped,
                base_frame: 0,
                elapsed_us: 0,
                next_tick_us: 10_000,
                volume: 1.0,
                frames_played: 0,
                opened: 0,
                started: 0,
                fail_resume: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A factory whose sinks all drive this device.
    pub fn factory(&self) -> impl SinkFactory + 'static {
        let device = self.clone();
        move |format: &AudioFormat,
              events: SinkEventSender,
              notify_interval: Duration|
              -> Result<Box<dyn AudioSink>, EngineError> {
            {
                let mut st = device.lock();
                st.format = Some(*format);
                st.events = Some(events);
                st.notify_interval_us = (notify_interval.as_micros() as i64).max(1);
                st.next_tick_us = st.notify_interval_us;
                st.stream = None;
                st.state = SinkState::Stopped;
                st.opened += 1;
            }
            Ok(Box::new(VirtualSink {
                device: device.clone(),
            }))
        }
    }

    /// Plays for `duration` of wall-clock time.
    pub fn advance(&self, duration: Duration) {
        self.lock().advance(duration.as_micros() as i64);
    }

    /// Simulates a device failure.
    pub fn inject_error(&self) {
        self.lock().set_state(SinkState::Error);
    }

    /// Makes the next `count` calls to `resume` fail.
    pub fn fail_next_resumes(&self, count: usize) {
        self.lock().fail_resume = count;
    }

    /// Simulates the device being stopped by the system.
    pub fn force_stop(&self) {
        let mut st = self.lock();
        st.stream = None;
        st.set_state(SinkState::Stopped);
    }

    pub fn state(&self) -> SinkState {
        self.lock().state
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.lock().format
    }

    /// Current read cursor in bytes.
    pub fn cursor(&self) -> usize {
        let st = self.lock();
        st.cursor_frame() * st.frame_size()
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    /// Total frames played across all starts.
    pub fn frames_played(&self) -> u64 {
        self.lock().frames_played
    }

    /// Times a sink was opened on this device.
    pub fn open_count(&self) -> usize {
        self.lock().opened
    }

    /// Times playback was started from a stream.
    pub fn start_count(&self) -> usize {
        self.lock().started
    }

    /// Identity of the stream currently attached.
    pub fn stream(&self) -> Option<Arc<PcmBuffer>> {
        self.lock().stream.clone()
    }
}

/// Sink half handed to the engine.
pub struct VirtualSink {
    device: VirtualDevice,
}

impl AudioSink for VirtualSink {
    fn start(&mut self, stream: Arc<PcmBuffer>, offset: usize) -> Result<(), EngineError> {
        let mut st = self.device.lock();
        let frame_size = st.frame_size();
        st.stream = Some(stream);
        st.reset_elapsed(offset / frame_size);
        st.started += 1;
        st.set_state(SinkState::Active);
        Ok(())
    }

    fn stop(&mut self) {
        let mut st = self.device.lock();
        st.stream = None;
        st.reset_elapsed(0);
        st.set_state(SinkState::Stopped);
    }

    fn suspend(&mut self) -> Result<(), EngineError> {
        let mut st = self.device.lock();
        if st.state == SinkState::Active {
            st.set_state(SinkState::Suspended);
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        let mut st = self.device.lock();
        if st.fail_resume > 0 {
            st.fail_resume -= 1;
            return Err(EngineError::Sink("virtual device refused to resume".into()));
        }
        if matches!(st.state, SinkState::Suspended | SinkState::Error) && st.stream.is_some() {
            st.set_state(SinkState::Active);
        }
        Ok(())
    }

    fn seek(&mut self, offset: usize) -> Result<(), EngineError> {
        let mut st = self.device.lock();
        let frame_size = st.frame_size();
        st.reset_elapsed(offset / frame_size);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), EngineError> {
        self.device.lock().volume = volume;
        Ok(())
    }

    fn cursor(&self) -> usize {
        self.device.cursor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn open(device: &VirtualDevice) -> (Box<dyn AudioSink>, mpsc::Receiver<SinkEvent>) {
        let (tx, rx) = mpsc::channel();
        let mut factory = device.factory();
        let sink = factory
            .open(&AudioFormat::pcm16(1, 1000), tx, Duration::from_millis(10))
            .unwrap();
        (sink, rx)
    }

    fn one_second() -> Arc<PcmBuffer> {
        Arc::new(PcmBuffer::from_decoded(AudioFormat::pcm16(1, 1000), vec![0; 2000]).unwrap())
    }

    #[test]
    fn test_progress_ticks() {
        let device = VirtualDevice::new();
        let (mut sink, rx) = open(&device);
        sink.start(one_second(), 0).unwrap();
        assert_eq!(rx.try_recv().unwrap(), SinkEvent::StateChanged(SinkState::Active));

        device.advance(Duration::from_millis(35));
        let ticks: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            ticks,
            vec![
                SinkEvent::Progress(10_000),
                SinkEvent::Progress(20_000),
                SinkEvent::Progress(30_000)
            ]
        );
        assert_eq!(sink.cursor(), 35 * 2);
    }

    #[test]
    fn test_drains_to_idle() {
        let device = VirtualDevice::new();
        let (mut sink, rx) = open(&device);
        sink.start(one_second(), 1900).unwrap();
        device.advance(Duration::from_secs(1));
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.last(), Some(&SinkEvent::StateChanged(SinkState::Idle)));
        assert!(events.contains(&SinkEvent::Progress(50_000)));
        assert_eq!(device.frames_played(), 50);
        assert_eq!(sink.cursor(), 2000);
    }

    #[test]
    fn test_suspend_holds_cursor() {
        let device = VirtualDevice::new();
        let (mut sink, _rx) = open(&device);
        sink.start(one_second(), 0).unwrap();
        device.advance(Duration::from_millis(100));
        sink.suspend().unwrap();
        device.advance(Duration::from_millis(100));
        assert_eq!(sink.cursor(), 200);
        sink.resume().unwrap();
        device.advance(Duration::from_millis(100));
        assert_eq!(sink.cursor(), 400);
    }

    #[test]
    fn test_seek_resets_elapsed() {
        let device = VirtualDevice::new();
        let (mut sink, rx) = open(&device);
        sink.start(one_second(), 0).unwrap();
        device.advance(Duration::from_millis(15));
        sink.seek(1000).unwrap();
        let _ = rx.try_iter().count();
        device.advance(Duration::from_millis(10));
        assert_eq!(rx.try_recv().unwrap(), SinkEvent::Progress(10_000));
        assert_eq!(sink.cursor(), 1020);
    }

    #[test]
    fn test_error_and_failed_resume() {
        let device = VirtualDevice::new();
        let (mut sink, rx) = open(&device);
        sink.start(one_second(), 0).unwrap();
        device.inject_error();
        device.fail_next_resumes(1);
        assert!(sink.resume().is_err());
        assert!(sink.resume().is_ok());
        let states: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            states,
            vec![
                SinkEvent::StateChanged(SinkState::Active),
                SinkEvent::StateChanged(SinkState::Error),
                SinkEvent::StateChanged(SinkState::Active),
            ]
        );
    }
}
