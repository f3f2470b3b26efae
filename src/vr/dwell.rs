//! Dwell selection: contact-driven dwell timer with debounced release.
//!
//! One `DwellSelector` per cursor/probe. The host feeds it contact
//! begin/end events from whatever physics or hit-testing it uses, plus
//! one `tick` per frame. Selections come back as `SelectionEvent`s.
//!
//! ```text
//! Idle ──begin──▶ Tracking ──tick, elapsed ≥ selection──▶ Selected
//!                  │  ▲                                      │
//!                 end │ begin (same target)                  end
//!                  ▼  │                                      ▼
//!               CoolingDown ──tick, timer ≥ debounce──▶ Idle
//! ```

use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::eye_tracking::VergenceEstimate;
use super::scene::{Highlight, TargetId, TargetScene};
use crate::config::ExperimentConfig;

// ── Dwell state ─────────────────────────────────────────────

/// Phase of the selector's single live contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwellPhase {
    /// No live contact.
    Idle,
    /// Contact held, accumulating dwell.
    Tracking,
    /// Dwell completed while the contact is still held.
    Selected,
    /// Contact released; dropped unless it resumes within the debounce delay.
    CoolingDown {
        timer: Duration,
        /// Phase the contact was in when released (`Selected` resumes as `Selected`).
        was_selected: bool,
    },
}

impl DwellPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Tracking => "tracking",
            Self::Selected => "selected",
            Self::CoolingDown { .. } => "cooling-down",
        }
    }
}

/// The live contact of a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DwellState {
    pub target: TargetId,
    pub elapsed: Duration,
    pub phase: DwellPhase,
}

// ── Dwell config ────────────────────────────────────────────

/// Dwell timing thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DwellConfig {
    /// Continuous contact needed to select.
    pub selection_time: Duration,
    /// How long a released contact may resume without losing its dwell.
    pub debounce_delay: Duration,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self {
            selection_time: Duration::from_millis(500),
            debounce_delay: Duration::from_millis(100),
        }
    }
}

impl From<&ExperimentConfig> for DwellConfig {
    fn from(config: &ExperimentConfig) -> Self {
        Self {
            selection_time: config.selection_time(),
            debounce_delay: config.debounce_delay(),
        }
    }
}

// ── Selection event ─────────────────────────────────────────

/// Emitted once per completed dwell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionEvent {
    pub target: TargetId,
    pub dwell_duration: Duration,
    /// `|focus - origin|` of the latest vergence estimate; `None` if unknown.
    pub vergence_distance: Option<f32>,
    /// Size reported by the scene; NaN if the scene does not know the target.
    pub object_size: f32,
    pub timestamp: Instant,
}

// ── Selector ────────────────────────────────────────────────

/// Dwell state machine for a single cursor.
#[derive(Debug, Clone)]
pub struct DwellSelector {
    pub id: usize,
    pub config: DwellConfig,
    state: Option<DwellState>,
}

/// Highlight changes never touch an armed probe, and a tracking
/// highlight never downgrades a selected target.
fn paint(scene: &mut dyn TargetScene, target: TargetId, highlight: Highlight) {
    let current = scene.highlight(target);
    let allowed = match (current, highlight) {
        (Highlight::Armed, _) => false,
        (Highlight::Selected, Highlight::Tracking) => false,
        (Highlight::Selected, Highlight::Idle) => false,
        _ => true,
    };
    if allowed && current != highlight {
        scene.set_highlight(target, highlight);
    }
}

impl DwellSelector {
    pub fn new(id: usize, config: DwellConfig) -> Self {
        Self {
            id,
            config,
            state: None,
        }
    }

    pub fn state(&self) -> Option<&DwellState> {
        self.state.as_ref()
    }

    pub fn phase(&self) -> DwellPhase {
        self.state.map(|s| s.phase).unwrap_or(DwellPhase::Idle)
    }

    pub fn current_target(&self) -> Option<TargetId> {
        self.state.map(|s| s.target)
    }

    /// Contact with `target` started.
    pub fn contact_begin(&mut self, target: TargetId, scene: &mut dyn TargetScene) {
        match self.state {
            Some(mut state) if state.target == target => {
                if let DwellPhase::CoolingDown { was_selected, .. } = state.phase {
                    // Quick re-contact: continue the same dwell.
                    state.phase = if was_selected {
                        DwellPhase::Selected
                    } else {
                        DwellPhase::Tracking
                    };
                    self.state = Some(state);
                    debug!(
                        selector = self.id,
                        target_id = target,
                        elapsed_ms = state.elapsed.as_millis() as u64,
                        "Dwell resumed within debounce window"
                    );
                    if !was_selected {
                        paint(scene, target, Highlight::Tracking);
                    }
                }
            }
            Some(prior) => {
                // A second target replaces the live contact; the prior one
                // is released without waiting for its cooldown.
                debug!(
                    selector = self.id,
                    prior = prior.target,
                    target_id = target,
                    "Contact switched to a new target"
                );
                paint(scene, prior.target, Highlight::Idle);
                self.start_tracking(target, scene);
            }
            None => self.start_tracking(target, scene),
        }
    }

    fn start_tracking(&mut self, target: TargetId, scene: &mut dyn TargetScene) {
        self.state = Some(DwellState {
            target,
            elapsed: Duration::ZERO,
            phase: DwellPhase::Tracking,
        });
        paint(scene, target, Highlight::Tracking);
        debug!(selector = self.id, target_id = target, "Dwell started");
    }

    /// Contact with `target` ended. Ignored unless it is the live contact.
    pub fn contact_end(&mut self, target: TargetId, scene: &mut dyn TargetScene) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        if state.target != target {
            return;
        }
        let was_selected = match state.phase {
            DwellPhase::Tracking => false,
            DwellPhase::Selected => true,
            DwellPhase::CoolingDown { .. } | DwellPhase::Idle => return,
        };
        state.phase = DwellPhase::CoolingDown {
            timer: Duration::ZERO,
            was_selected,
        };
        if !was_selected {
            paint(scene, target, Highlight::Idle);
        }
        debug!(selector = self.id, target_id = target, "Contact released, cooling down");
    }

    /// Advance timers by one frame. Returns a selection when a dwell completes.
    pub fn tick(
        &mut self,
        dt: Duration,
        now: Instant,
        vergence: &VergenceEstimate,
        scene: &mut dyn TargetScene,
    ) -> Option<SelectionEvent> {
        let state = self.state.as_mut()?;
        match state.phase {
            DwellPhase::Idle | DwellPhase::Selected => None,
            DwellPhase::Tracking => {
                state.elapsed += dt;
                if state.elapsed < self.config.selection_time {
                    return None;
                }
                state.phase = DwellPhase::Selected;
                let target = state.target;
                let dwell_duration = state.elapsed;
                paint(scene, target, Highlight::Selected);

                let vergence_distance = vergence.distance();
                if vergence_distance.is_none() {
                    debug!(selector = self.id, target_id = target, "No vergence estimate for selection");
                }
                let object_size = scene.object_size(target).unwrap_or(f32::NAN);

                info!(
                    selector = self.id,
                    target_id = target,
                    dwell_ms = dwell_duration.as_millis() as u64,
                    distance = ?vergence_distance,
                    size = object_size,
                    "Target selected"
                );
                Some(SelectionEvent {
                    target,
                    dwell_duration,
                    vergence_distance,
                    object_size,
                    timestamp: now,
                })
            }
            DwellPhase::CoolingDown {
                timer,
                was_selected,
            } => {
                let timer = timer + dt;
                if timer >= self.config.debounce_delay {
                    debug!(selector = self.id, target_id = state.target, "Dwell reset after debounce");
                    self.state = None;
                } else {
                    state.phase = DwellPhase::CoolingDown {
                        timer,
                        was_selected,
                    };
                }
                None
            }
        }
    }

    /// Drop any live contact without emitting anything.
    pub fn reset(&mut self) {
        self.state = None;
    }

    /// S-expression status for diagnostics.
    pub fn status_sexp(&self) -> String {
        let target_str = self
            .current_target()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "nil".to_string());
        let elapsed_ms = self.state.map(|s| s.elapsed.as_millis()).unwrap_or(0);
        format!(
            "(:selector {} :phase :{} :target {} :elapsed-ms {} :selection-ms {} :debounce-ms {})",
            self.id,
            self.phase().as_str(),
            target_str,
            elapsed_ms,
            self.config.selection_time.as_millis(),
            self.config.debounce_delay.as_millis(),
        )
    }
}

// ── Tests ───────────────────────────────────────────────────
