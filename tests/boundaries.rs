//! Playback restricted to a window of the source.

mod common;

use common::{positions, recording_engine, stereo_buffer, TempFile};
use std::time::Duration;
use tempokit::{EngineError, EngineEvent, PlaybackState, PlaybackWindow, StretchParameters};

const START: i64 = 2_000_000;
const END: i64 = 8_000_000;

fn ten_second_track(name: &str) -> TempFile {
    TempFile::with_wav(name, &stereo_buffer(44100, 10.0))
}

#[test]
fn test_positions_stay_inside_window_and_end_on_time() {
    let wav = ten_second_track("window_identity.wav");
    let (mut engine, device, events) = recording_engine();
    engine.load(&wav.0).unwrap();
    engine.set_boundaries(START, END).unwrap();
    assert_eq!(engine.window(), Some(PlaybackWindow::new(START, END)));

    engine.play(StretchParameters::identity()).unwrap();
    for _ in 0..599 {
        device.advance(Duration::from_millis(10));
        engine.process_sink_events();
    }
    assert_eq!(engine.state(), Some(PlaybackState::Playing));
    assert!(!events.borrow().contains(&EngineEvent::Ended));

    device.advance(Duration::from_millis(10));
    engine.process_sink_events();
    assert!(events.borrow().contains(&EngineEvent::Ended));
    assert_eq!(engine.state(), Some(PlaybackState::Stopped));

    let seen = positions(&events);
    assert!(seen.iter().all(|&p| (START..=END).contains(&p) || p == 0));
    assert_eq!(seen.iter().rev().nth(1), Some(&END));
    assert_eq!(seen.last(), Some(&START));
}

#[test]
fn test_window_with_double_tempo_ends_in_half_the_time() {
    let wav = ten_second_track("window_tempo.wav");
    let (mut engine, device, events) = recording_engine();
    engine.load(&wav.0).unwrap();
    engine.set_boundaries(START, END).unwrap();
    engine.play(StretchParameters::new(100.0, 0)).unwrap();

    device.advance(Duration::from_millis(2990));
    engine.process_sink_events();
    assert!(!events.borrow().contains(&EngineEvent::Ended));
    assert_eq!(engine.position().map(|p| p.play_time_us), Some(7_980_000));

    device.advance(Duration::from_millis(10));
    engine.process_sink_events();
    assert!(events.borrow().contains(&EngineEvent::Ended));
}

#[test]
fn test_set_boundaries_while_playing_stops() {
    let wav = ten_second_track("window_stop.wav");
    let (mut engine, device, events) = recording_engine();
    engine.load(&wav.0).unwrap();
    engine.play(StretchParameters::identity()).unwrap();
    device.advance(Duration::from_millis(500));
    engine.process_sink_events();

    engine.set_boundaries(START, 0).unwrap();
    assert_eq!(engine.state(), Some(PlaybackState::Stopped));
    assert_eq!(engine.window(), Some(PlaybackWindow::new(START, 10_000_000)));
    assert_eq!(engine.position().map(|p| p.play_time_us), Some(START));

    let events = events.borrow();
    let n = events.len();
    assert_eq!(events[n - 2], EngineEvent::PlayPositionChanged(START));
    assert_eq!(events[n - 1], EngineEvent::Stopped);
}

#[test]
fn test_invalid_boundaries_and_seeks() {
    let wav = ten_second_track("window_invalid.wav");
    let (mut engine, _device, _events) = recording_engine();
    engine.load(&wav.0).unwrap();

    assert!(matches!(
        engine.set_boundaries(5_000_000, 4_000_000),
        Err(EngineError::InvalidParameter(_))
    ));
    assert!(engine.set_boundaries(-1, END).is_err());
    assert_eq!(engine.window(), Some(PlaybackWindow::new(0, 10_000_000)));

    engine.set_boundaries(START, 20_000_000).unwrap();
    assert_eq!(engine.window(), Some(PlaybackWindow::new(START, 10_000_000)));
    assert!(engine.seek(1_000_000).is_err());
    engine.seek(3_000_000).unwrap();
    assert_eq!(engine.position().map(|p| p.play_time_us), Some(3_000_000));
}

#[test]
fn test_seek_then_play_starts_at_target() {
    let wav = ten_second_track("window_seek.wav");
    let (mut engine, device, _events) = recording_engine();
    engine.load(&wav.0).unwrap();
    engine.set_boundaries(START, END).unwrap();
    engine.seek(5_000_000).unwrap();
    engine.play(StretchParameters::identity()).unwrap();
    device.advance(Duration::from_millis(250));
    engine.process_sink_events();
    assert_eq!(engine.position().map(|p| p.play_time_us), Some(5_250_000));
}
