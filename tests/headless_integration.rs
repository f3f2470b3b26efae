//! Headless integration tests for the experiment core.
//!
//! These tests validate config loading from disk, clock plumbing and the
//! geometry/vergence layer through the public API, without a scripted
//! session in between.

use pretty_assertions::assert_eq;

use vergence_lab::clock::{Clock, FrameClock, TestClock};
use vergence_lab::config::{ConfigError, ExperimentConfig, SessionMode};
use vergence_lab::session::{Session, SessionEvent};
use vergence_lab::vr::eye_tracking::{Eye, GazeTracker, SimulatedGaze, VergenceEstimator};
use vergence_lab::vr::geometry::{closest_point_between_rays, Ray};
use vergence_lab::vr::scene::{Mat4, TargetLayout, Vec3};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn temp_config(name: &str, json: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "vergence-lab-{}-{}.json",
        std::process::id(),
        name
    ));
    std::fs::write(&path, json).unwrap();
    path
}

// ── Config loading ──────────────────────────────────────────

#[test]
fn test_config_load_from_file() {
    let path = temp_config(
        "load",
        r#"{
            "selection_time_s": 0.3,
            "debounce_delay_s": 0.05,
            "target_positions": [[0, 0, 0.5], [0.2, 0, 0.5]],
            "target_scales": [[0.1, 0.1, 0.1], [0.1, 0.1, 0.1]]
        }"#,
    );
    let config = ExperimentConfig::load(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(config.selection_time(), Duration::from_millis(300));
    assert_eq!(config.debounce_delay(), Duration::from_millis(50));
    assert_eq!(config.restart_delay(), Duration::from_secs(10));
    assert_eq!(config.mode, SessionMode::Trials);

    let session = Session::from_config(&config).unwrap();
    assert_eq!(session.aggregator().trial().targets, vec![0, 1]);
}

#[test]
fn test_config_missing_file_is_io_error() {
    let path = std::env::temp_dir().join("vergence-lab-does-not-exist.json");
    let err = ExperimentConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("vergence-lab-does-not-exist.json"));
}

#[test]
fn test_config_error_messages() {
    let path = temp_config("bad", r#"{"selection_time_s": -0.5}"#);
    let err = ExperimentConfig::load(&path).unwrap_err();
    let _ = std::fs::remove_file(&path);
    assert_eq!(
        err.to_string(),
        "selection_time_s must be a finite, non-negative number of seconds (got -0.5)"
    );
}

// ── Clock plumbing ──────────────────────────────────────────

#[test]
fn test_clock_advance_deterministic() {
    let clock = TestClock::new();
    let t0 = clock.now();
    let ms0 = clock.unix_millis();

    clock.advance(Duration::from_secs(10));

    assert_eq!(clock.now() - t0, Duration::from_secs(10));
    assert_eq!(clock.unix_millis() - ms0, 10_000);
}

#[test]
fn test_frame_clock_drives_session_ticks() {
    let clock = Arc::new(TestClock::new());
    let mut frames = FrameClock::new(clock.clone());
    let mut session = Session::from_config(&ExperimentConfig::default())
        .unwrap()
        .with_gaze_cursor(0);
    let mut gaze = SimulatedGaze::new();
    gaze.head = Vec3::new(0.0, 0.0, -0.8);
    gaze.fixate(Vec3::new(0.0, 0.0, 0.2));

    let mut events = Vec::new();
    // Uneven frame times still add up to the selection threshold
    for ms in [16, 16, 17, 100, 200, 151] {
        clock.advance(Duration::from_millis(ms));
        let (now, dt) = frames.tick();
        events.extend(session.tick(&mut gaze, &Mat4::IDENTITY, now, dt));
    }
    assert_eq!(frames.frames(), 6);

    let selected: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Selection(s) => Some((s.target, s.dwell_duration)),
            _ => None,
        })
        .collect();
    assert_eq!(selected, vec![(2, Duration::from_millis(500))]);
}

// ── Geometry and vergence through the public API ────────────

#[test]
fn test_closest_point_reference_case() {
    let a = Ray::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0));
    let b = Ray::new(Vec3::new(1.0, 0.0, 5.0), Vec3::new(-1.0, 0.0, 0.0));
    let r = closest_point_between_rays(&a, &b);
    assert!(r.valid);
    assert!(r.midpoint.distance(Vec3::new(0.0, 0.0, 5.0)) < 1e-5);
}

#[test]
fn test_simulated_tracker_vergence_distance() {
    let mut gaze = SimulatedGaze::new();
    let now = TestClock::new().now();
    for depth in [0.3f32, 0.6, 1.2] {
        gaze.fixate(Vec3::new(0.0, 0.1, depth));
        let est = VergenceEstimator::new().estimate_from(&mut gaze, now);
        assert!(est.valid);
        let expected = Vec3::new(0.0, 0.1, depth).length();
        assert!((est.distance().unwrap() - expected).abs() < 1e-3);
    }

    gaze.lose_tracking();
    assert!(gaze.gaze_ray(Eye::Left, now).is_none());
    assert!(!VergenceEstimator::new().estimate_from(&mut gaze, now).valid);
}

#[test]
fn test_layout_and_session_agree_on_targets() {
    let config = ExperimentConfig::default();
    let layout = TargetLayout::from_config(&config);
    let session = Session::from_config(&config).unwrap();
    assert_eq!(layout.target_ids(), session.aggregator().trial().targets);
    assert_eq!(session.aggregator().trial_index(), 1);
}
