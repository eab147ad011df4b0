//! Original-time / real-time conversion.

use tempokit::playback::clock::{to_original, to_real};
use tempokit::{EngineError, PlaybackClock};

#[test]
fn test_known_values() {
    let clock = PlaybackClock::new(100.0).unwrap();
    assert_eq!(clock.to_real(2_000_000), 1_000_000);
    assert_eq!(clock.to_original(1_000_000), 2_000_000);

    let clock = PlaybackClock::new(-50.0).unwrap();
    assert_eq!(clock.to_real(1_000_000), 2_000_000);
    assert_eq!(clock.to_original(2_000_000), 1_000_000);

    assert_eq!(to_real(123_456, 0.0).unwrap(), 123_456);
}

#[test]
fn test_roundtrip_within_rounding_tolerance() {
    for tempo in [-90.0, -33.3, -1.0, 0.0, 7.5, 25.0, 100.0, 250.0] {
        let clock = PlaybackClock::new(tempo).unwrap();
        let tolerance = ((100.0 + tempo) / 100.0f64).ceil().max(1.0) as i64;
        for t in [0i64, 1, 17, 999, 1_000_000, 12_345_678, 3_600_000_000] {
            let back = clock.to_original(clock.to_real(t));
            assert!(
                (back - t).abs() <= tolerance,
                "tempo {}: {} -> {} (tolerance {})",
                tempo,
                t,
                back,
                tolerance
            );
        }
    }
}

#[test]
fn test_monotonic() {
    let clock = PlaybackClock::new(37.0).unwrap();
    let mut last = i64::MIN;
    for t in (0..2_000_000).step_by(7_919) {
        let real = clock.to_real(t);
        assert!(real >= last);
        last = real;
    }
}

#[test]
fn test_degenerate_tempo() {
    assert!(matches!(
        PlaybackClock::new(-100.0),
        Err(EngineError::InvalidParameter(_))
    ));
    assert!(to_original(10, -150.0).is_err());
    assert!(to_real(10, f64::INFINITY).is_err());
}
