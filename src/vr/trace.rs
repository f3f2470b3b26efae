//! Vergence trace: moves the probe along a straight path for a fixed
//! duration and samples the focus point every frame.
//!
//! A run is a coroutine with one suspension point per tick: the caller
//! drives it with `tick` until it reports `TraceTick::Finished`.

use std::io::{self, Write};
use std::time::Duration;

use tracing::{debug, info};

use super::eye_tracking::VergenceEstimate;
use super::scene::{Highlight, TargetId, TargetScene, Vec3};
use crate::config::ProbeConfig;

// ── Recording ───────────────────────────────────────────────

/// One sampled focus point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceSample {
    pub elapsed: Duration,
    pub point: Vec3,
}

/// Ordered samples of a single run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceRecording {
    pub samples: Vec<TraceSample>,
}

impl TraceRecording {
    pub const CSV_HEADER: &'static str = "time,x,y,z";

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Write the `time,x,y,z` table, one row per sample.
    pub fn write_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "{}", Self::CSV_HEADER)?;
        for s in &self.samples {
            writeln!(
                out,
                "{},{},{},{}",
                s.elapsed.as_secs_f64(),
                s.point.x,
                s.point.y,
                s.point.z
            )?;
        }
        out.flush()
    }

    pub fn to_csv(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_csv(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

// ── Sampler ─────────────────────────────────────────────────

/// Outcome of one sampler tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceTick {
    /// No run in progress.
    Idle,
    /// Run in progress; `sampled` is true if this frame produced a sample.
    Running { sampled: bool },
    /// The run just ended; the probe has been reset and re-armed.
    Finished(TraceRecording),
}

/// Drives the probe and records the vergence trace.
#[derive(Debug)]
pub struct TraceSampler {
    pub probe: TargetId,
    pub start: Vec3,
    pub end: Vec3,
    pub duration: Duration,
    elapsed: Duration,
    running: bool,
    recording: TraceRecording,
    runs: u32,
}

impl TraceSampler {
    pub fn new(probe: TargetId, start: Vec3, end: Vec3, duration: Duration) -> Self {
        Self {
            probe,
            start,
            end,
            duration,
            elapsed: Duration::ZERO,
            running: false,
            recording: TraceRecording::default(),
            runs: 0,
        }
    }

    pub fn from_config(probe: TargetId, config: &ProbeConfig, duration: Duration) -> Self {
        Self::new(probe, Vec3::from(config.start), Vec3::from(config.end), duration)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of completed runs.
    pub fn runs(&self) -> u32 {
        self.runs
    }

    /// Samples collected so far in the current run.
    pub fn recording(&self) -> &TraceRecording {
        &self.recording
    }

    /// Begin a run. Ignored if one is already in progress.
    pub fn start(&mut self, scene: &mut dyn TargetScene) {
        if self.running {
            debug!(probe = self.probe, "Trace already running");
            return;
        }
        self.running = true;
        self.elapsed = Duration::ZERO;
        self.recording = TraceRecording::default();
        scene.set_highlight(self.probe, Highlight::Tracking);
        scene.set_position(self.probe, self.start);
        info!(
            probe = self.probe,
            duration_s = self.duration.as_secs_f64(),
            "Trace run started"
        );
    }

    /// Probe position at the current elapsed time.
    pub fn probe_position(&self) -> Vec3 {
        let t = if self.duration.is_zero() {
            1.0
        } else {
            (self.elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0) as f32
        };
        self.start.lerp(self.end, t)
    }

    /// Advance the run by one frame.
    pub fn tick(
        &mut self,
        dt: Duration,
        vergence: &VergenceEstimate,
        scene: &mut dyn TargetScene,
    ) -> TraceTick {
        if !self.running {
            return TraceTick::Idle;
        }

        self.elapsed += dt;
        scene.set_position(self.probe, self.probe_position());

        let sampled = vergence.valid && vergence.focus_point.length() > 0.0;
        if sampled {
            self.recording.samples.push(TraceSample {
                elapsed: self.elapsed,
                point: vergence.focus_point,
            });
        }

        if self.elapsed < self.duration {
            return TraceTick::Running { sampled };
        }

        self.running = false;
        self.runs += 1;
        scene.set_position(self.probe, self.start);
        scene.set_highlight(self.probe, Highlight::Armed);
        let recording = std::mem::take(&mut self.recording);
        info!(
            probe = self.probe,
            run = self.runs,
            samples = recording.len(),
            "Trace run finished"
        );
        TraceTick::Finished(recording)
    }
}

// ── Tests ───────────────────────────────────────────────────
