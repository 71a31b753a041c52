//! Playback controller - the public façade over scheduler, projector and script.
//!
//! Commands go to the [`Scheduler`]; whenever one changes state the
//! controller projects the new position and hands every subscriber the same
//! complete [`Snapshot`].
//!
//! # Usage
//!
//! ```ignore
//! use replay_core::{PlaybackController, PlaybackConfig, Script};
//! use replay_env::VirtualClock;
//!
//! let clock = VirtualClock::new();
//! let mut controller = PlaybackController::new(script, clock.clone(), PlaybackConfig::default());
//! let sub = controller.subscribe(|snapshot| println!("{}", snapshot.phase()));
//!
//! controller.start();
//! while let Some(id) = clock.pop_due(limit) {
//!     controller.fire(id);
//! }
//! controller.unsubscribe(sub);
//! ```

use replay_env::{Clock, TimerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

use crate::model::{A2AMessage, AgentId, AgentStatus, Phase};
use crate::projector::{project, DerivedState};
use crate::scheduler::{PlaybackConfig, PlaybackState, RunMode, Scheduler, Transition};
use crate::script::Script;
use crate::speed::Speed;

/// Complete state handed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub playback: PlaybackState,
    pub derived: DerivedState,
}

impl Snapshot {
    pub fn phase(&self) -> Phase {
        self.derived.phase
    }

    pub fn agent_statuses(&self) -> &BTreeMap<AgentId, AgentStatus> {
        &self.derived.agents
    }

    pub fn visible_messages(&self) -> &[A2AMessage] {
        &self.derived.visible_messages
    }

    pub fn run_mode(&self) -> RunMode {
        self.playback.run_mode
    }

    pub fn index(&self) -> Option<usize> {
        self.playback.index
    }
}

/// Handle returned by [`PlaybackController::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A state-change listener.
pub type Listener = Box<dyn FnMut(&Snapshot) + Send>;

/// A controller command, as issued by a UI or the live driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    StepForward,
    SetSpeed(Speed),
    Reset,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Start => write!(f, "start"),
            Command::Pause => write!(f, "pause"),
            Command::Resume => write!(f, "resume"),
            Command::StepForward => write!(f, "step"),
            Command::SetSpeed(speed) => write!(f, "speed {}", speed),
            Command::Reset => write!(f, "reset"),
        }
    }
}

impl std::str::FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let verb = parts.next().unwrap_or_default().to_lowercase();
        match verb.as_str() {
            "start" | "play" | "replay" => Ok(Command::Start),
            "pause" => Ok(Command::Pause),
            "resume" => Ok(Command::Resume),
            "step" | "next" => Ok(Command::StepForward),
            "reset" => Ok(Command::Reset),
            "speed" => {
                let value = parts.next().ok_or("Usage: speed <multiplier>")?;
                value.parse().map(Command::SetSpeed)
            }
            "" => Err("Empty command".to_string()),
            _ => Err(format!("Unknown command: {}", s.trim())),
        }
    }
}

/// Public playback façade.
pub struct PlaybackController<C: Clock> {
    scheduler: Scheduler<C>,

    /// Subscribers in registration order
    listeners: Vec<(SubscriptionId, Listener)>,

    next_subscription: u64,
}

impl<C: Clock> PlaybackController<C> {
    /// Creates an idle controller over a shared script.
    pub fn new(script: Arc<Script>, clock: C, config: PlaybackConfig) -> Self {
        Self {
            scheduler: Scheduler::new(script, clock, config),
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Creates an idle controller with default configuration.
    pub fn with_script(script: Script, clock: C) -> Self {
        Self::new(Arc::new(script), clock, PlaybackConfig::default())
    }

    pub fn script(&self) -> &Arc<Script> {
        self.scheduler.script()
    }

    pub fn clock(&self) -> &C {
        self.scheduler.clock()
    }

    pub fn state(&self) -> PlaybackState {
        self.scheduler.state()
    }

    pub fn run_mode(&self) -> RunMode {
        self.scheduler.run_mode()
    }

    /// Id of the scheduler's outstanding timer.
    pub fn pending_timer(&self) -> Option<TimerId> {
        self.scheduler.pending_timer()
    }

    /// Builds a snapshot of the current position.
    pub fn snapshot(&self) -> Snapshot {
        let playback = self.scheduler.state();
        Snapshot {
            derived: project(self.scheduler.script(), playback.index),
            playback,
        }
    }

    pub fn start(&mut self) -> Transition {
        self.apply_with(Scheduler::start)
    }

    pub fn pause(&mut self) -> Transition {
        self.apply_with(Scheduler::pause)
    }

    pub fn resume(&mut self) -> Transition {
        self.apply_with(Scheduler::resume)
    }

    pub fn step_forward(&mut self) -> Transition {
        self.apply_with(Scheduler::step_forward)
    }

    pub fn set_speed(&mut self, speed: Speed) -> Transition {
        self.apply_with(|s| s.set_speed(speed))
    }

    /// Returns to idle. Idempotent; always succeeds.
    pub fn reset(&mut self) -> Transition {
        self.apply_with(Scheduler::reset)
    }

    /// Delivers an expired timer from the clock.
    pub fn fire(&mut self, id: TimerId) -> Transition {
        self.apply_with(|s| s.fire(id))
    }

    /// Dispatches a [`Command`].
    pub fn apply(&mut self, command: Command) -> Transition {
        match command {
            Command::Start => self.start(),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::StepForward => self.step_forward(),
            Command::SetSpeed(speed) => self.set_speed(speed),
            Command::Reset => self.reset(),
        }
    }

    /// Registers a listener called synchronously after every state change.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&Snapshot) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    /// Tears the controller down, cancelling any pending timer.
    ///
    /// Dropping has the same effect; this just makes teardown explicit.
    pub fn dispose(self) {}

    fn apply_with<F>(&mut self, transition: F) -> Transition
    where
        F: FnOnce(&mut Scheduler<C>) -> Transition,
    {
        let outcome = transition(&mut self.scheduler);
        if outcome.is_applied() {
            self.notify();
        }
        outcome
    }

    fn notify(&mut self) {
        if self.listeners.is_empty() {
            return;
        }

        let snapshot = self.snapshot();
        trace!(
            "Notifying {} listeners at {} ({})",
            self.listeners.len(),
            snapshot.playback.position(),
            snapshot.run_mode()
        );
        for (_, listener) in self.listeners.iter_mut() {
            listener(&snapshot);
        }
    }
}
