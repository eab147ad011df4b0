//! Playback controller: owns the source and processed buffers, drives an
//! [`AudioSink`] and reports to observers.
//!
//! The engine is `Unloaded` until a successful [`Engine::load`], then
//! `Ready` in one of the [`PlaybackState`]s. All control operations run on
//! the caller's thread. Sink notifications are queued and handled by
//! [`Engine::process_sink_events`] / [`Engine::wait_sink_events`] on the same
//! thread, never re-entrantly.

use crate::config::EngineConfig;
use crate::core::pcm::PcmBuffer;
use crate::core::types::{
    AudioFormat, PlaybackState, PlaybackWindow, Position, StretchParameters,
};
use crate::error::EngineError;
use crate::io::decoder::{DefaultDecoder, Decoder, FileKind};
use crate::io::wav;
use crate::playback::clock::PlaybackClock;
use crate::playback::observer::{
    ChannelObserver, EngineEvent, Observer, ObserverList, SubscriptionId,
};
use crate::playback::sink::{SinkEvent, SinkFactory, SinkGuard, SinkState};
use crate::stream::pipeline::TimeStretchProcessor;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Everything that exists only while a source is loaded.
struct Session {
    path: PathBuf,
    source: Arc<PcmBuffer>,
    output: Arc<PcmBuffer>,
    applied: StretchParameters,
    clock: PlaybackClock,
    window: PlaybackWindow,
    state: PlaybackState,
    /// Original-time at which the sink's elapsed counter reads zero.
    cursor_origin_us: i64,
    /// Byte offset in `output` to start from when leaving `Stopped`.
    start_offset: usize,
    position_us: i64,
    retry_used: bool,
    sink: SinkGuard,
    events: Receiver<SinkEvent>,
}

impl Session {
    /// Byte offset in the processed output for an original-time instant.
    fn output_offset(&self, original_us: i64) -> usize {
        self.output
            .time_to_byte_offset(self.clock.to_real(original_us))
    }

    /// Drops queued notifications that predate a transport change.
    fn discard_pending_events(&self) {
        let stale = self.events.try_iter().count();
        if stale > 0 {
            log::trace!("discarded {} stale sink event(s)", stale);
        }
    }

    /// Halts the sink and parks the cursor at the window start.
    fn park_at_window_start(&mut self) {
        self.sink.stop();
        self.discard_pending_events();
        self.state = PlaybackState::Stopped;
        self.cursor_origin_us = self.window.start_time_us;
        self.position_us = self.window.start_time_us;
        self.start_offset = self.output_offset(self.window.start_time_us);
    }
}

/// Audio playback engine with independent tempo and pitch control.
pub struct Engine {
    config: EngineConfig,
    processor: TimeStretchProcessor,
    decoder: Box<dyn Decoder>,
    sink_factory: Box<dyn SinkFactory>,
    observers: ObserverList,
    session: Option<Session>,
}

impl Engine {
    /// Creates an unloaded engine with the default config and decoder.
    pub fn new(sink_factory: impl SinkFactory + 'static) -> Self {
        let config = EngineConfig::default();
        Self {
            processor: config.processor(),
            config,
            decoder: Box::new(DefaultDecoder),
            sink_factory: Box::new(sink_factory),
            observers: ObserverList::new(),
            session: None,
        }
    }

    /// Replaces the config; the processor is rebuilt from it.
    pub fn with_config(mut self, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        self.processor = config.processor();
        self.config = config;
        Ok(self)
    }

    pub fn with_decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    pub fn with_processor(mut self, processor: TimeStretchProcessor) -> Self {
        self.processor = processor;
        self
    }

    /// Registers an observer; notified after every state mutation, in
    /// registration order.
    pub fn subscribe(&mut self, observer: impl Observer + 'static) -> SubscriptionId {
        self.observers.subscribe(Box::new(observer))
    }

    /// Registers a channel that receives a clone of every event.
    pub fn subscribe_channel(&mut self, sender: Sender<EngineEvent>) -> SubscriptionId {
        self.subscribe(ChannelObserver::from(sender))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    // ---- queries ----

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state() == Some(PlaybackState::Playing)
    }

    /// `None` while unloaded.
    pub fn state(&self) -> Option<PlaybackState> {
        self.session.as_ref().map(|s| s.state)
    }

    /// Duration of the loaded source in original-time microseconds.
    pub fn duration_us(&self) -> Option<i64> {
        self.session.as_ref().map(|s| s.source.duration_us())
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.session.as_ref().map(|s| *s.source.format())
    }

    /// The resolved window; its end is never the end-of-source sentinel.
    pub fn window(&self) -> Option<PlaybackWindow> {
        self.session.as_ref().map(|s| s.window)
    }

    pub fn position(&self) -> Option<Position> {
        self.session.as_ref().map(|s| Position::new(s.position_us))
    }

    /// Parameters the current output buffer was rendered with.
    pub fn parameters(&self) -> Option<StretchParameters> {
        self.session.as_ref().map(|s| s.applied)
    }

    pub fn source(&self) -> Option<Arc<PcmBuffer>> {
        self.session.as_ref().map(|s| s.source.clone())
    }

    pub fn output(&self) -> Option<Arc<PcmBuffer>> {
        self.session.as_ref().map(|s| s.output.clone())
    }

    pub fn path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn volume(&self) -> f32 {
        self.config.volume
    }

    // ---- control ----

    /// Decodes `path` and makes it the current source.
    ///
    /// On success the engine is `Ready`/`Stopped` with an identity-processed
    /// output, a freshly opened sink and the full-duration window; replacing
    /// a source that was playing or paused reports `Stopped` first. On
    /// failure nothing observable changes, except that a sink failing to open
    /// leaves the engine unloaded.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let path = path.as_ref();
        let kind = FileKind::from_path(path)?;
        let source = self.decoder.decode(path, kind)?;
        if source.is_empty() {
            return Err(EngineError::Decode(format!(
                "{} contains no audio frames",
                path.display()
            )));
        }
        let output = self.processor.process(&source, StretchParameters::identity())?;
        let window = PlaybackWindow::full().resolve(source.duration_us())?;
        let format = *source.format();

        // Tear down the previous sink before opening the next one.
        let was_active = self
            .session
            .take()
            .map_or(false, |old| old.state != PlaybackState::Stopped);

        let (tx, rx) = mpsc::channel();
        let sink = self
            .sink_factory
            .open(&format, tx, self.config.notify_interval())
            .and_then(|sink| {
                let mut sink = SinkGuard::new(sink);
                sink.set_volume(self.config.volume)?;
                Ok(sink)
            });
        let sink = match sink {
            Ok(sink) => sink,
            Err(e) => {
                if was_active {
                    self.observers.emit(&EngineEvent::Stopped);
                }
                return Err(e);
            }
        };

        log::info!(
            "loaded {} ({} ch, {} Hz, {}-bit, {:.3}s)",
            path.display(),
            format.channel_count,
            format.sample_rate,
            format.bits_per_sample,
            source.duration_seconds()
        );

        let output = Arc::new(output);
        let length = output.len();
        self.session = Some(Session {
            path: path.to_path_buf(),
            source: Arc::new(source),
            output: output.clone(),
            applied: StretchParameters::identity(),
            clock: PlaybackClock::default(),
            window,
            state: PlaybackState::Stopped,
            cursor_origin_us: 0,
            start_offset: 0,
            position_us: 0,
            retry_used: false,
            sink,
            events: rx,
        });

        if was_active {
            self.observers.emit(&EngineEvent::Stopped);
        }
        self.observers.emit(&EngineEvent::FormatChanged(format));
        self.observers.emit(&EngineEvent::BufferChanged {
            offset: 0,
            length,
            buffer: output,
        });
        self.observers.emit(&EngineEvent::PlayPositionChanged(0));
        Ok(())
    }

    /// Unloads the current source, closing the sink.
    pub fn unload(&mut self) {
        if let Some(session) = self.session.take() {
            log::debug!("unloaded {}", session.path.display());
            if session.state != PlaybackState::Stopped {
                self.observers.emit(&EngineEvent::Stopped);
            }
        }
    }

    /// Restricts playback to `[start_us, end_us]` of original-time. An
    /// `end_us` of zero or below means the end of the source.
    ///
    /// Stops playback and parks the cursor at `start_us`.
    pub fn set_boundaries(&mut self, start_us: i64, end_us: i64) -> Result<(), EngineError> {
        let Some(s) = self.session.as_mut() else {
            return Ok(());
        };
        let window = PlaybackWindow::new(start_us, end_us).resolve(s.source.duration_us())?;
        let was = s.state;

        s.window = window;
        s.park_at_window_start();
        let offset = s.start_offset;
        s.sink.seek(offset)?;

        log::debug!(
            "window set to [{}, {}] us",
            window.start_time_us,
            window.end_time_us
        );
        self.observers
            .emit(&EngineEvent::PlayPositionChanged(window.start_time_us));
        if was != PlaybackState::Stopped {
            self.observers.emit(&EngineEvent::Stopped);
        }
        Ok(())
    }

    /// Starts or resumes playback with the given parameters.
    ///
    /// Reprocesses the whole source first when the parameters differ from
    /// the ones the current output was rendered with, then restarts from the
    /// window start. A no-op while already playing.
    pub fn play(&mut self, parameters: StretchParameters) -> Result<(), EngineError> {
        let Some(s) = self.session.as_mut() else {
            return Ok(());
        };
        parameters.validate()?;
        if s.state == PlaybackState::Playing {
            return Ok(());
        }

        if parameters != s.applied {
            let clock = PlaybackClock::new(parameters.tempo_change_percent)?;
            let output = self.processor.process(&s.source, parameters)?;
            log::debug!(
                "reprocessed with tempo {:+}% pitch {:+} st: {} -> {} bytes",
                parameters.tempo_change_percent,
                parameters.pitch_change_semitones,
                s.source.len(),
                output.len()
            );

            s.output = Arc::new(output);
            s.applied = parameters;
            s.clock = clock;
            s.park_at_window_start();

            self.observers.emit(&EngineEvent::BufferChanged {
                offset: 0,
                length: s.output.len(),
                buffer: s.output.clone(),
            });
        }

        match s.state {
            PlaybackState::Paused => s.sink.resume()?,
            _ => {
                let window_end = s.output_offset(s.window.end_time_us);
                if s.start_offset >= s.output.len() || s.start_offset >= window_end {
                    s.start_offset = s.output_offset(s.window.start_time_us);
                    s.cursor_origin_us = s.window.start_time_us;
                    s.position_us = s.window.start_time_us;
                }
                s.discard_pending_events();
                s.sink.start(s.output.clone(), s.start_offset)?;
            }
        }

        s.state = PlaybackState::Playing;
        s.retry_used = false;
        log::debug!("playing from {} us", s.position_us);
        self.observers.emit(&EngineEvent::Playing);
        Ok(())
    }

    /// Suspends playback, keeping the cursor. Only valid while playing.
    pub fn pause(&mut self) -> Result<(), EngineError> {
        let Some(s) = self.session.as_mut() else {
            return Ok(());
        };
        if s.state != PlaybackState::Playing {
            return Ok(());
        }
        s.sink.suspend()?;
        s.state = PlaybackState::Paused;
        log::debug!("paused at {} us", s.position_us);
        self.observers.emit(&EngineEvent::Paused);
        Ok(())
    }

    /// Halts playback and rewinds to the window start.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        let Some(s) = self.session.as_mut() else {
            return Ok(());
        };
        let was = s.state;
        let moved = s.position_us != s.window.start_time_us;
        s.park_at_window_start();
        if moved {
            self.observers
                .emit(&EngineEvent::PlayPositionChanged(s.window.start_time_us));
        }
        if was != PlaybackState::Stopped {
            log::debug!("stopped");
            self.observers.emit(&EngineEvent::Stopped);
        }
        Ok(())
    }

    /// Moves the play position to `time_us` (original-time) inside the window.
    pub fn seek(&mut self, time_us: i64) -> Result<(), EngineError> {
        let Some(s) = self.session.as_mut() else {
            return Ok(());
        };
        if !s.window.contains(time_us) {
            return Err(EngineError::InvalidParameter(format!(
                "seek target {} us outside window [{}, {}]",
                time_us, s.window.start_time_us, s.window.end_time_us
            )));
        }
        let offset = s.output_offset(time_us);
        if s.state != PlaybackState::Stopped {
            s.sink.seek(offset)?;
        }
        // Ticks queued before the reposition belong to the old cursor.
        s.discard_pending_events();
        s.start_offset = offset;
        s.cursor_origin_us = time_us;
        s.position_us = time_us;
        self.observers.emit(&EngineEvent::PlayPositionChanged(time_us));
        Ok(())
    }

    /// Sets the output gain, `0 < volume <= 1`.
    pub fn set_volume(&mut self, volume: f32) -> Result<(), EngineError> {
        if !(volume > 0.0 && volume <= 1.0) {
            return Err(EngineError::InvalidParameter(format!(
                "volume must lie in (0, 1], got {}",
                volume
            )));
        }
        if let Some(s) = self.session.as_mut() {
            s.sink.set_volume(volume)?;
        }
        self.config.volume = volume;
        Ok(())
    }

    /// Writes the processed output restricted to the window as a WAV file.
    pub fn export_window(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let s = self.loaded()?;
        let start = s.output_offset(s.window.start_time_us);
        let end = s.output_offset(s.window.end_time_us);
        let region = s.output.slice_bytes(start, end);
        wav::save_wav(path.as_ref(), &region)
    }

    /// Writes the unprocessed source as a WAV file.
    pub fn save_source(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let s = self.loaded()?;
        wav::save_wav(path.as_ref(), &s.source)
    }

    fn loaded(&self) -> Result<&Session, EngineError> {
        self.session
            .as_ref()
            .ok_or_else(|| EngineError::InvalidParameter("no source loaded".to_string()))
    }

    // ---- sink notifications ----

    /// Handles every queued sink notification. Returns how many were handled.
    pub fn process_sink_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.session.as_ref().and_then(|s| s.events.try_recv().ok()) {
            self.handle_sink_event(event);
            handled += 1;
        }
        handled
    }

    /// Blocks up to `timeout` for the first notification, then drains the
    /// queue. Returns how many were handled.
    pub fn wait_sink_events(&mut self, timeout: Duration) -> usize {
        let first = match self.session.as_ref() {
            Some(s) => s.events.recv_timeout(timeout),
            None => return 0,
        };
        match first {
            Ok(event) => {
                self.handle_sink_event(event);
                1 + self.process_sink_events()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    fn handle_sink_event(&mut self, event: SinkEvent) {
        match event {
            SinkEvent::Progress(elapsed_us) => self.on_progress(elapsed_us),
            SinkEvent::StateChanged(state) => self.on_sink_state(state),
        }
    }

    fn on_progress(&mut self, elapsed_real_us: i64) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        if s.state != PlaybackState::Playing {
            return;
        }
        let position = s.cursor_origin_us + s.clock.to_original(elapsed_real_us);
        if position >= s.window.end_time_us {
            self.finish_window();
        } else if position != s.position_us {
            let position = position.max(s.window.start_time_us);
            s.position_us = position;
            self.observers
                .emit(&EngineEvent::PlayPositionChanged(position));
        }
    }

    /// Playback reached the window end or the stream drained.
    fn finish_window(&mut self) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        let end = s.window.end_time_us;
        let start = s.window.start_time_us;
        let report_end = s.position_us != end;
        s.position_us = end;
        s.park_at_window_start();

        log::debug!("reached end of window at {} us", end);
        if report_end {
            self.observers.emit(&EngineEvent::PlayPositionChanged(end));
        }
        self.observers.emit(&EngineEvent::Ended);
        self.observers.emit(&EngineEvent::PlayPositionChanged(start));
    }

    /// Playback halted for a reason other than reaching the end.
    fn halt(&mut self) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        let start = s.window.start_time_us;
        s.park_at_window_start();
        self.observers.emit(&EngineEvent::Stopped);
        self.observers.emit(&EngineEvent::PlayPositionChanged(start));
    }

    fn on_sink_state(&mut self, state: SinkState) {
        let Some(s) = self.session.as_mut() else {
            return;
        };
        match state {
            SinkState::Active | SinkState::Suspended => {}
            SinkState::Idle => {
                if s.state == PlaybackState::Playing {
                    self.finish_window();
                }
            }
            SinkState::Stopped => {
                if s.state != PlaybackState::Stopped {
                    log::warn!("audio sink stopped unexpectedly");
                    self.halt();
                }
            }
            SinkState::Error => {
                if s.state != PlaybackState::Playing {
                    log::warn!("audio sink reported an error while not playing");
                    return;
                }
                if s.sink.cursor() >= s.output.len() {
                    self.finish_window();
                } else if !s.retry_used {
                    s.retry_used = true;
                    log::warn!("audio sink error, resuming once");
                    if let Err(e) = s.sink.resume() {
                        log::error!("audio sink failed to resume: {}", e);
                        self.halt();
                    }
                } else {
                    log::error!("audio sink error recurred, stopping playback");
                    self.halt();
                }
            }
        }
    }
}
