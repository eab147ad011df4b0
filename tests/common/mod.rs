#![allow(dead_code)]

use std::cell::RefCell;
use std::f32::consts::PI;
use std::path::PathBuf;
use std::rc::Rc;

use tempokit::io::wav::write_wav;
use tempokit::{AudioFormat, Engine, EngineEvent, PcmBuffer, VirtualDevice};

pub fn gen_sine(freq_hz: f32, sr: u32, frames: usize, amp: f32) -> Vec<f32> {
    (0..frames)
        .map(|i| amp * (2.0 * PI * freq_hz * i as f32 / sr as f32).sin())
        .collect()
}

/// Interleaved stereo with a different tone per channel.
pub fn gen_stereo(left_hz: f32, right_hz: f32, sr: u32, frames: usize) -> Vec<f32> {
    let left = gen_sine(left_hz, sr, frames, 0.5);
    let right = gen_sine(right_hz, sr, frames, 0.4);
    left.iter()
        .zip(&right)
        .flat_map(|(&l, &r)| [l, r])
        .collect()
}

pub fn sine_buffer(freq_hz: f32, sr: u32, secs: f64) -> PcmBuffer {
    let frames = (sr as f64 * secs).round() as usize;
    PcmBuffer::from_samples(AudioFormat::pcm16(1, sr), &gen_sine(freq_hz, sr, frames, 0.5))
        .unwrap()
}

pub fn stereo_buffer(sr: u32, secs: f64) -> PcmBuffer {
    let frames = (sr as f64 * secs).round() as usize;
    PcmBuffer::from_samples(AudioFormat::pcm16(2, sr), &gen_stereo(220.0, 330.0, sr, frames))
        .unwrap()
}

/// Zero-crossing frequency estimate of the first channel.
pub fn estimate_freq(samples: &[f32], channels: usize, sr: u32) -> f32 {
    let mono: Vec<f32> = samples.iter().step_by(channels).copied().collect();
    let crossings = mono
        .windows(2)
        .filter(|w| w[0] < 0.0 && w[1] >= 0.0)
        .count();
    crossings as f32 * sr as f32 / mono.len() as f32
}

/// Unique temp path; the file is removed when the guard drops.
pub struct TempFile(pub PathBuf);

impl TempFile {
    pub fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "tempokit_{}_{}",
            std::process::id(),
            name
        ));
        TempFile(path)
    }

    pub fn with_wav(name: &str, buffer: &PcmBuffer) -> Self {
        let file = Self::new(name);
        std::fs::write(&file.0, write_wav(buffer)).unwrap();
        file
    }

    pub fn with_bytes(name: &str, bytes: &[u8]) -> Self {
        let file = Self::new(name);
        std::fs::write(&file.0, bytes).unwrap();
        file
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

pub type EventLog = Rc<RefCell<Vec<EngineEvent>>>;

/// Engine on a virtual device with every event recorded.
pub fn recording_engine() -> (Engine, VirtualDevice, EventLog) {
    let device = VirtualDevice::new();
    let mut engine = Engine::new(device.factory());
    let events: EventLog = Rc::new(RefCell::new(Vec::new()));
    let log = events.clone();
    engine.subscribe(move |e: &EngineEvent| log.borrow_mut().push(e.clone()));
    (engine, device, events)
}

pub fn positions(events: &EventLog) -> Vec<i64> {
    events
        .borrow()
        .iter()
        .filter_map(|e| match e {
            EngineEvent::PlayPositionChanged(us) => Some(*us),
            _ => None,
        })
        .collect()
}
