//! Scripted input for headless sessions and integration tests.
//!
//! Provides `InputEvent` enum and `InputProvider` trait so a whole
//! experiment (fixations, contacts, waits) can be replayed as a single
//! deterministic sequence. Live hosts feed the session directly instead.

use std::collections::VecDeque;
use std::time::Duration;

use crate::vr::scene::{TargetId, Vec3};

/// A unified input event that can be injected into a session.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Both simulated eyes converge on a point (tracker space).
    Fixate { point: Vec3 },
    /// Simulated tracker stops reporting gaze.
    LoseTracking,
    /// Physics contact between a selector and a target started.
    ContactBegin { selector: usize, target: TargetId },
    /// Physics contact ended.
    ContactEnd { selector: usize, target: TargetId },
    /// Run frames for a duration (used in scripted sequences).
    Wait { duration: Duration },
}

impl InputEvent {
    pub fn wait_ms(ms: u64) -> Self {
        Self::Wait {
            duration: Duration::from_millis(ms),
        }
    }

    pub fn fixate(x: f32, y: f32, z: f32) -> Self {
        Self::Fixate {
            point: Vec3::new(x, y, z),
        }
    }
}

/// Trait for providing input events to a session.
pub trait InputProvider: Send {
    /// Get the next input event, if any.
    fn next_event(&mut self) -> Option<InputEvent>;
    /// Whether there are more events to deliver.
    fn has_events(&self) -> bool;
}

/// A scripted input provider that delivers events from a pre-defined queue.
pub struct ScriptedInputProvider {
    events: VecDeque<InputEvent>,
}

impl ScriptedInputProvider {
    /// Create from a vector of events.
    pub fn new(events: Vec<InputEvent>) -> Self {
        Self {
            events: VecDeque::from(events),
        }
    }

    /// Number of remaining events.
    pub fn remaining(&self) -> usize {
        self.events.len()
    }

    /// Total scripted wait time still queued.
    pub fn remaining_duration(&self) -> Duration {
        self.events
            .iter()
            .filter_map(|e| match e {
                InputEvent::Wait { duration } => Some(*duration),
                _ => None,
            })
            .sum()
    }
}

impl InputProvider for ScriptedInputProvider {
    fn next_event(&mut self) -> Option<InputEvent> {
        self.events.pop_front()
    }

    fn has_events(&self) -> bool {
        !self.events.is_empty()
    }
}

/// A recording wrapper that logs all events from an inner provider.
pub struct RecordingProvider<P: InputProvider> {
    inner: P,
    recorded: Vec<InputEvent>,
}

impl<P: InputProvider> RecordingProvider<P> {
    /// Wrap an existing provider with recording.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            recorded: Vec::new(),
        }
    }

    /// Get all recorded events.
    pub fn recorded(&self) -> &[InputEvent] {
        &self.recorded
    }

    /// Consume and return recorded events.
    pub fn into_recorded(self) -> Vec<InputEvent> {
        self.recorded
    }
}

impl<P: InputProvider> InputProvider for RecordingProvider<P> {
    fn next_event(&mut self) -> Option<InputEvent> {
        let event = self.inner.next_event()?;
        self.recorded.push(event.clone());
        Some(event)
    }

    fn has_events(&self) -> bool {
        self.inner.has_events()
    }
}
