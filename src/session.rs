//! Experiment session: wires the tracker, vergence estimator, dwell
//! selectors, trial aggregator and trace sampler onto one frame clock.
//!
//! Per-tick ordering:
//! 1. vergence estimate (and tracking health)
//! 2. gaze-cursor contacts, then every `DwellSelector::tick`
//! 3. selections routed to the aggregator (trials) or the trace trigger
//! 4. trace sampler step
//! 5. restart timer
//!
//! Everything the tick produces comes back as `SessionEvent`s in
//! emission order.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::clock::SteppedClock;
use crate::config::{ConfigError, ExperimentConfig, SessionMode};
use crate::input_source::{InputEvent, InputProvider};
use crate::vr::dwell::{DwellConfig, DwellSelector, SelectionEvent};
use crate::vr::eye_tracking::{
    GazeHealth, GazeTracker, SimulatedGaze, SpatialReference, VergenceEstimate, VergenceEstimator,
};
use crate::vr::scene::{Highlight, TargetId, TargetLayout, TargetScene};
use crate::vr::trace::{TraceRecording, TraceSampler, TraceTick};
use crate::vr::trial::{TrialAggregator, TrialReport};

// ── Events ──────────────────────────────────────────────────

/// Something observable that happened during a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Selection(SelectionEvent),
    TrialComplete(TrialReport),
    TrialStarted { trial: u32 },
    TraceStarted { probe: TargetId },
    TraceFinished(TraceRecording),
    TrackingLost,
    TrackingRecovered,
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Selection(_) => "selection",
            Self::TrialComplete(_) => "trial-complete",
            Self::TrialStarted { .. } => "trial-started",
            Self::TraceStarted { .. } => "trace-started",
            Self::TraceFinished(_) => "trace-finished",
            Self::TrackingLost => "tracking-lost",
            Self::TrackingRecovered => "tracking-recovered",
        }
    }
}

// ── Gaze cursor ─────────────────────────────────────────────

/// Contact change derived by a `GazeCursor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contact {
    Begin(TargetId),
    End(TargetId),
}

/// Stands in for the host's physics: the vergence focus point is the
/// cursor, and whatever target contains it is in contact.
#[derive(Debug, Clone)]
pub struct GazeCursor {
    pub selector: usize,
    current: Option<TargetId>,
}

impl GazeCursor {
    pub fn new(selector: usize) -> Self {
        Self {
            selector,
            current: None,
        }
    }

    pub fn current(&self) -> Option<TargetId> {
        self.current
    }

    /// Contact changes since the previous frame (end before begin).
    pub fn update(&mut self, estimate: &VergenceEstimate, scene: &dyn TargetScene) -> Vec<Contact> {
        let hit = if estimate.valid {
            scene.hit_test(estimate.focus_point)
        } else {
            None
        };
        if hit == self.current {
            return Vec::new();
        }
        let mut contacts = Vec::with_capacity(2);
        if let Some(prev) = self.current {
            contacts.push(Contact::End(prev));
        }
        if let Some(next) = hit {
            contacts.push(Contact::Begin(next));
        }
        self.current = hit;
        contacts
    }
}

// ── Session ─────────────────────────────────────────────────

fn sexp_bool(b: bool) -> &'static str {
    if b {
        "t"
    } else {
        "nil"
    }
}

/// One experiment run over a host scene.
pub struct Session<S: TargetScene> {
    mode: SessionMode,
    scene: S,
    estimator: VergenceEstimator,
    health: GazeHealth,
    selectors: Vec<DwellSelector>,
    dwell_config: DwellConfig,
    cursor: Option<GazeCursor>,
    aggregator: TrialAggregator,
    sampler: Option<TraceSampler>,
    last_estimate: VergenceEstimate,
    frames: u64,
}

impl<S: TargetScene> Session<S> {
    /// Build a session with one selector. In trial mode the first trial
    /// over `targets` starts immediately.
    pub fn new(
        config: &ExperimentConfig,
        mut scene: S,
        targets: Vec<TargetId>,
        probe: Option<TargetId>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let sampler = match (config.mode, probe, &config.probe) {
            (SessionMode::Trace, Some(id), Some(path)) => {
                Some(TraceSampler::from_config(id, path, config.move_duration()))
            }
            (SessionMode::Trace, _, _) => return Err(ConfigError::MissingProbe),
            (SessionMode::Trials, _, _) => None,
        };

        let dwell_config = DwellConfig::from(config);
        let mut aggregator = TrialAggregator::new(config.restart_delay());
        if config.mode == SessionMode::Trials {
            aggregator.start_trial(targets, &mut scene);
        }

        info!(
            mode = config.mode.as_str(),
            selection_ms = dwell_config.selection_time.as_millis() as u64,
            debounce_ms = dwell_config.debounce_delay.as_millis() as u64,
            "Session created"
        );

        Ok(Self {
            mode: config.mode,
            scene,
            estimator: VergenceEstimator::new(),
            health: GazeHealth::new(),
            selectors: vec![DwellSelector::new(0, dwell_config)],
            dwell_config,
            cursor: None,
            aggregator,
            sampler,
            last_estimate: VergenceEstimate::INVALID,
            frames: 0,
        })
    }

    /// Drive selector `selector` from the vergence focus point.
    pub fn with_gaze_cursor(mut self, selector: usize) -> Self {
        self.cursor = Some(GazeCursor::new(selector));
        self
    }

    /// Add another cursor/probe selector. Returns its index.
    pub fn add_selector(&mut self) -> usize {
        let id = self.selectors.len();
        self.selectors.push(DwellSelector::new(id, self.dwell_config));
        id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn selector(&self, index: usize) -> Option<&DwellSelector> {
        self.selectors.get(index)
    }

    pub fn aggregator(&self) -> &TrialAggregator {
        &self.aggregator
    }

    pub fn sampler(&self) -> Option<&TraceSampler> {
        self.sampler.as_ref()
    }

    pub fn health(&self) -> &GazeHealth {
        &self.health
    }

    pub fn last_estimate(&self) -> &VergenceEstimate {
        &self.last_estimate
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Host physics: contact between `selector` and `target` started.
    pub fn begin_contact(&mut self, selector: usize, target: TargetId) {
        match self.selectors.get_mut(selector) {
            Some(s) => s.contact_begin(target, &mut self.scene),
            None => warn!(selector, target_id = target, "Contact begin for unknown selector"),
        }
    }

    /// Host physics: contact between `selector` and `target` ended.
    pub fn end_contact(&mut self, selector: usize, target: TargetId) {
        match self.selectors.get_mut(selector) {
            Some(s) => s.contact_end(target, &mut self.scene),
            None => warn!(selector, target_id = target, "Contact end for unknown selector"),
        }
    }

    /// Restart the current trial immediately (trial mode only).
    pub fn restart_now(&mut self) -> Option<SessionEvent> {
        if self.mode != SessionMode::Trials {
            return None;
        }
        self.aggregator.restart_now(&mut self.scene);
        Some(SessionEvent::TrialStarted {
            trial: self.aggregator.trial_index(),
        })
    }

    /// Run one frame.
    pub fn tick(
        &mut self,
        tracker: &mut dyn GazeTracker,
        reference: &dyn SpatialReference,
        now: Instant,
        dt: Duration,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        self.frames += 1;

        // 1. Vergence
        self.estimator.set_reference(reference.tracker_to_world());
        let estimate = self.estimator.estimate_from(tracker, now);
        let was_lost = self.health.tracking_lost;
        self.health.update(estimate.valid, now);
        match (was_lost, self.health.tracking_lost) {
            (false, true) => events.push(SessionEvent::TrackingLost),
            (true, false) => events.push(SessionEvent::TrackingRecovered),
            _ => {}
        }
        self.last_estimate = estimate;

        // 2. Contacts and dwell
        let contacts = match self.cursor.as_mut() {
            Some(cursor) => {
                let selector = cursor.selector;
                cursor
                    .update(&estimate, &self.scene)
                    .into_iter()
                    .map(|c| (selector, c))
                    .collect()
            }
            None => Vec::new(),
        };
        for (selector, contact) in contacts {
            match contact {
                Contact::Begin(target) => self.begin_contact(selector, target),
                Contact::End(target) => self.end_contact(selector, target),
            }
        }

        let mut selections = Vec::new();
        for selector in &mut self.selectors {
            if let Some(selection) = selector.tick(dt, now, &estimate, &mut self.scene) {
                selections.push(selection);
            }
        }

        // 3. Routing
        let restart_was_pending = self.aggregator.restart_pending();
        for selection in selections {
            events.push(SessionEvent::Selection(selection));
            match self.mode {
                SessionMode::Trials => {
                    if let Some(report) = self.aggregator.on_selection_event(&selection) {
                        events.push(SessionEvent::TrialComplete(report));
                    }
                }
                SessionMode::Trace => self.maybe_start_trace(&selection, &mut events),
            }
        }

        // 4. Trace
        if let Some(sampler) = self.sampler.as_mut() {
            if let TraceTick::Finished(recording) = sampler.tick(dt, &estimate, &mut self.scene) {
                events.push(SessionEvent::TraceFinished(recording));
            }
        }

        // 5. Restart timer, counted from the frame after completion
        if restart_was_pending && self.aggregator.tick(dt, &mut self.scene) {
            events.push(SessionEvent::TrialStarted {
                trial: self.aggregator.trial_index(),
            });
        }

        events
    }

    /// Selecting the armed probe is the only way a trace run starts.
    fn maybe_start_trace(&mut self, selection: &SelectionEvent, events: &mut Vec<SessionEvent>) {
        let Some(sampler) = self.sampler.as_mut() else {
            return;
        };
        if selection.target != sampler.probe {
            debug!(target_id = selection.target, "Selection ignored in trace mode");
            return;
        }
        if sampler.is_running() || self.scene.highlight(sampler.probe) != Highlight::Armed {
            debug!(probe = sampler.probe, "Probe selected while not armed");
            return;
        }
        sampler.start(&mut self.scene);
        events.push(SessionEvent::TraceStarted {
            probe: sampler.probe,
        });
    }

    /// Replay a scripted input sequence. `Wait` events run frames of
    /// `1/fps` seconds on `clock`; the simulated tracker follows `Fixate`.
    pub fn run_script(
        &mut self,
        provider: &mut dyn InputProvider,
        gaze: &mut SimulatedGaze,
        clock: &dyn SteppedClock,
        fps: u32,
    ) -> Vec<SessionEvent> {
        let frame = Duration::from_secs(1) / fps.max(1);
        let reference = *self.estimator.reference();
        let mut events = Vec::new();

        while let Some(input) = provider.next_event() {
            match input {
                InputEvent::Fixate { point } => gaze.fixate(point),
                InputEvent::LoseTracking => gaze.lose_tracking(),
                InputEvent::ContactBegin { selector, target } => self.begin_contact(selector, target),
                InputEvent::ContactEnd { selector, target } => self.end_contact(selector, target),
                InputEvent::Wait { duration } => {
                    let frames = duration.as_nanos().div_ceil(frame.as_nanos());
                    for _ in 0..frames {
                        clock.step(frame);
                        let now = clock.now();
                        events.extend(self.tick(gaze, &reference, now, frame));
                    }
                }
            }
        }
        debug!(frames = self.frames, events = events.len(), "Script finished");
        events
    }

    /// S-expression status for diagnostics.
    pub fn status_sexp(&self) -> String {
        let trial = self.aggregator.trial();
        let selectors = self
            .selectors
            .iter()
            .map(|s| s.status_sexp())
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "(:mode :{} :frames {} :trial {} :hits {} :targets {} :complete {} \
             :trace-running {} :tracking-lost {} :selectors ({}))",
            self.mode.as_str(),
            self.frames,
            self.aggregator.trial_index(),
            trial.hit_count,
            trial.targets.len(),
            sexp_bool(self.aggregator.is_complete()),
            sexp_bool(self.sampler.as_ref().is_some_and(|s| s.is_running())),
            sexp_bool(self.health.tracking_lost),
            selectors,
        )
    }
}

impl Session<TargetLayout> {
    /// Session over the in-memory layout described by `config`.
    pub fn from_config(config: &ExperimentConfig) -> Result<Self, ConfigError> {
        let scene = TargetLayout::from_config(config);
        let targets = scene.target_ids();
        let probe = scene.probe_id();
        Self::new(config, scene, targets, probe)
    }
}

// ── Tests ───────────────────────────────────────────────────
