//! Trial aggregation: per-target hit times, vergence metrics, Fitts'
//! index of difficulty, completion and automatic restart.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use super::dwell::SelectionEvent;
use super::scene::{TargetId, TargetScene};

/// Fitts' index of difficulty, `2 * distance / size`.
///
/// NaN when the size is not positive or the distance is unknown.
pub fn fitts_index_of_difficulty(distance: Option<f32>, size: f32) -> f32 {
    match distance {
        Some(d) if size > 0.0 => 2.0 * d / size,
        _ => f32::NAN,
    }
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

// ── Trial ───────────────────────────────────────────────────

/// Gaze-derived metrics captured at the moment a target was hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetMetrics {
    pub vergence_distance: Option<f32>,
    pub object_size: f32,
}

/// One pass over the target set.
#[derive(Debug, Clone, Default)]
pub struct Trial {
    pub targets: Vec<TargetId>,
    /// Time since the first hit; absent until the target is hit.
    pub hit_time: HashMap<TargetId, Duration>,
    pub metrics: HashMap<TargetId, TargetMetrics>,
    /// Set once, at the first recorded hit.
    pub start_time: Option<Instant>,
    pub hit_count: usize,
}

impl Trial {
    pub fn new(targets: Vec<TargetId>) -> Self {
        Self {
            targets,
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.targets.is_empty() && self.hit_count == self.targets.len()
    }

    pub fn contains(&self, target: TargetId) -> bool {
        self.targets.contains(&target)
    }
}

// ── Report ──────────────────────────────────────────────────

/// Per-target line of a trial report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetReport {
    pub target: TargetId,
    #[serde(rename = "elapsed_s", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub vergence_distance: Option<f32>,
    pub object_size: f32,
    /// NaN (serialized as `null`) when undefined.
    pub fitts_index_of_difficulty: f32,
}

/// Read-only summary of a completed trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialReport {
    pub trial: u32,
    pub targets: Vec<TargetReport>,
}

impl TrialReport {
    fn from_trial(index: u32, trial: &Trial) -> Self {
        let targets = trial
            .targets
            .iter()
            .filter_map(|&target| {
                let elapsed = *trial.hit_time.get(&target)?;
                let metrics = trial.metrics.get(&target).copied().unwrap_or(TargetMetrics {
                    vergence_distance: None,
                    object_size: f32::NAN,
                });
                Some(TargetReport {
                    target,
                    elapsed,
                    vergence_distance: metrics.vergence_distance,
                    object_size: metrics.object_size,
                    fitts_index_of_difficulty: fitts_index_of_difficulty(
                        metrics.vergence_distance,
                        metrics.object_size,
                    ),
                })
            })
            .collect();
        Self {
            trial: index,
            targets,
        }
    }

    pub fn get(&self, target: TargetId) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.target == target)
    }

    /// Human-readable results block.
    pub fn summary(&self) -> String {
        let mut out = format!("Trial {}\nTarget hit times:\n", self.trial);
        for t in &self.targets {
            let id = if t.fitts_index_of_difficulty.is_nan() {
                "n/a".to_string()
            } else {
                format!("{:.2}", t.fitts_index_of_difficulty)
            };
            let _ = writeln!(
                out,
                "target-{}: {:.2} seconds (ID {})",
                t.target,
                t.elapsed.as_secs_f64(),
                id
            );
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ── Aggregator ──────────────────────────────────────────────

/// Consumes selection events and governs trial advancement.
#[derive(Debug)]
pub struct TrialAggregator {
    trial: Trial,
    /// Delay between completion and the automatic next trial.
    pub restart_delay: Duration,
    /// Time since completion while a restart is pending.
    restart_timer: Option<Duration>,
    completed: bool,
    trial_index: u32,
}

impl TrialAggregator {
    pub fn new(restart_delay: Duration) -> Self {
        Self {
            trial: Trial::default(),
            restart_delay,
            restart_timer: None,
            completed: false,
            trial_index: 0,
        }
    }

    pub fn trial(&self) -> &Trial {
        &self.trial
    }

    /// 1-based index of the current trial (0 before the first start).
    pub fn trial_index(&self) -> u32 {
        self.trial_index
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn restart_pending(&self) -> bool {
        self.restart_timer.is_some()
    }

    /// Begin a fresh trial over `targets`, restoring the scene layout.
    pub fn start_trial(&mut self, targets: Vec<TargetId>, scene: &mut dyn TargetScene) {
        scene.reset_layout();
        for &t in &targets {
            scene.set_active(t, true);
        }
        self.trial_index += 1;
        info!(
            trial = self.trial_index,
            targets = targets.len(),
            "Trial started"
        );
        self.trial = Trial::new(targets);
        self.completed = false;
        self.restart_timer = None;
    }

    /// Restart immediately with the same targets.
    pub fn restart_now(&mut self, scene: &mut dyn TargetScene) {
        let targets = self.trial.targets.clone();
        self.start_trial(targets, scene);
    }

    /// Record a selection. Returns the report when this event completes the trial.
    pub fn on_selection_event(&mut self, event: &SelectionEvent) -> Option<TrialReport> {
        if self.completed {
            debug!(target_id = event.target, "Trial already complete, selection ignored");
            return None;
        }
        if !self.trial.contains(event.target) {
            warn!(target_id = event.target, "Selection for target outside current trial");
            return None;
        }
        if let Some(existing) = self.trial.hit_time.get(&event.target) {
            debug!(
                target_id = event.target,
                hit_s = existing.as_secs_f64(),
                "Target already hit"
            );
            return None;
        }

        let hit_time = match self.trial.start_time {
            Some(start) => event.timestamp.saturating_duration_since(start),
            None => Duration::ZERO,
        };
        self.trial.hit_time.insert(event.target, hit_time);
        self.trial.metrics.insert(
            event.target,
            TargetMetrics {
                vergence_distance: event.vergence_distance,
                object_size: event.object_size,
            },
        );

        let hit_count = self.trial.hit_time.len();
        if self.trial.hit_count == 0 && hit_count == 1 {
            self.trial.start_time = Some(event.timestamp);
            debug!(trial = self.trial_index, "Trial clock started at first hit");
        }
        self.trial.hit_count = hit_count;
        info!(
            trial = self.trial_index,
            target_id = event.target,
            hit_s = hit_time.as_secs_f64(),
            hits = hit_count,
            of = self.trial.targets.len(),
            "Target hit recorded"
        );

        if !self.trial.is_complete() {
            return None;
        }

        self.completed = true;
        self.restart_timer = Some(Duration::ZERO);
        let report = TrialReport::from_trial(self.trial_index, &self.trial);
        info!(trial = self.trial_index, "Trial complete");
        Some(report)
    }

    /// Advance the restart timer. Returns true if a new trial was started.
    pub fn tick(&mut self, dt: Duration, scene: &mut dyn TargetScene) -> bool {
        let Some(timer) = self.restart_timer else {
            return false;
        };
        let timer = timer + dt;
        if timer >= self.restart_delay {
            self.restart_now(scene);
            true
        } else {
            self.restart_timer = Some(timer);
            false
        }
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExperimentConfig;
    use crate::vr::scene::{Highlight, TargetLayout};

    fn event(target: TargetId, at: Instant) -> SelectionEvent {
        SelectionEvent {
            target,
            dwell_duration: Duration::from_millis(500),
            vergence_distance: Some(0.4),
            object_size: 0.05,
            timestamp: at,
        }
    }

    fn setup() -> (TrialAggregator, TargetLayout, Instant) {
        let mut scene = TargetLayout::from_config(&ExperimentConfig::default());
        let mut agg = TrialAggregator::new(Duration::from_secs(10));
        agg.start_trial(vec![0, 1, 2], &mut scene);
        (agg, scene, Instant::now())
    }

    #[test]
    fn test_fitts_index() {
        assert!((fitts_index_of_difficulty(Some(0.4), 0.05) - 16.0).abs() < 1e-4);
        assert!(fitts_index_of_difficulty(Some(0.4), 0.0).is_nan());
        assert!(fitts_index_of_difficulty(Some(0.4), -1.0).is_nan());
        assert!(fitts_index_of_difficulty(None, 0.05).is_nan());
    }

    #[test]
    fn test_hits_relative_to_first_hit() {
        let (mut agg, _, t0) = setup();
        assert!(agg.on_selection_event(&event(2, t0)).is_none());
        assert_eq!(agg.trial().start_time, Some(t0));
        assert_eq!(agg.trial().hit_time[&2], Duration::ZERO);

        assert!(agg
            .on_selection_event(&event(0, t0 + Duration::from_millis(1200)))
            .is_none());
        assert_eq!(agg.trial().hit_time[&0], Duration::from_millis(1200));
        assert_eq!(agg.trial().hit_count, 2);

        let report = agg
            .on_selection_event(&event(1, t0 + Duration::from_millis(2500)))
            .expect("trial should complete");
        assert_eq!(report.trial, 1);
        assert_eq!(report.targets.len(), 3);
        assert_eq!(report.get(1).unwrap().elapsed, Duration::from_millis(2500));
        assert!((report.get(0).unwrap().fitts_index_of_difficulty - 16.0).abs() < 1e-4);
    }

    #[test]
    fn test_duplicate_hit_is_idempotent() {
        let (mut agg, _, t0) = setup();
        agg.on_selection_event(&event(0, t0));
        agg.on_selection_event(&event(1, t0 + Duration::from_secs(1)));
        agg.on_selection_event(&event(1, t0 + Duration::from_secs(3)));
        assert_eq!(agg.trial().hit_time[&1], Duration::from_secs(1));
        assert_eq!(agg.trial().hit_count, 2);
        assert!(!agg.is_complete());
    }

    #[test]
    fn test_unknown_target_ignored() {
        let (mut agg, _, t0) = setup();
        assert!(agg.on_selection_event(&event(42, t0)).is_none());
        assert_eq!(agg.trial().hit_count, 0);
        assert!(agg.trial().start_time.is_none());
    }

    #[test]
    fn test_completion_fires_once() {
        let (mut agg, _, t0) = setup();
        let reports: Vec<_> = [0, 1, 2, 2, 0, 1]
            .iter()
            .enumerate()
            .filter_map(|(i, &t)| {
                agg.on_selection_event(&event(t, t0 + Duration::from_millis(i as u64 * 100)))
            })
            .collect();
        assert_eq!(reports.len(), 1);
        assert!(agg.is_complete());
        assert!(agg.restart_pending());
    }

    #[test]
    fn test_zero_size_reports_nan() {
        let (mut agg, _, t0) = setup();
        let mut e = event(0, t0);
        e.object_size = 0.0;
        agg.on_selection_event(&e);
        agg.on_selection_event(&event(1, t0));
        let report = agg.on_selection_event(&event(2, t0)).unwrap();
        assert!(report.get(0).unwrap().fitts_index_of_difficulty.is_nan());
        assert!(report.summary().contains("target-0: 0.00 seconds (ID n/a)"));
        assert!(report.summary().contains("target-1: 0.00 seconds (ID 16.00)"));

        let json = report.to_json().unwrap();
        assert!(json.contains("\"fitts_index_of_difficulty\": null"));
    }

    #[test]
    fn test_restart_after_delay() {
        let (mut agg, mut scene, t0) = setup();
        for t in 0..3 {
            agg.on_selection_event(&event(t, t0));
        }
        scene.set_highlight(1, Highlight::Selected);

        assert!(!agg.tick(Duration::from_secs(9), &mut scene));
        assert!(agg.is_complete());
        assert!(agg.tick(Duration::from_secs(1), &mut scene));

        assert!(!agg.is_complete());
        assert_eq!(agg.trial_index(), 2);
        assert_eq!(agg.trial().hit_count, 0);
        assert!(agg.trial().start_time.is_none());
        assert_eq!(agg.trial().targets, vec![0, 1, 2]);
        assert_eq!(scene.highlight(1), Highlight::Idle);
    }

    #[test]
    fn test_tick_without_completion_is_noop() {
        let (mut agg, mut scene, _) = setup();
        assert!(!agg.tick(Duration::from_secs(60), &mut scene));
        assert_eq!(agg.trial_index(), 1);
    }
}
