//! Playback scheduler - the state machine that walks a script over time.
//!
//! # States
//!
//! ```text
//!            start                 pause
//!   Idle ──────────────► Running ─────────► Paused
//!    │  ▲                 │  ▲   ◄─────────   │
//!    │  │ reset           │  │     resume     │
//!    │  └─────────(any)   │  └ fire(pending)  │ step_forward
//!    │ step_forward       ▼                   ▼
//!    └──────────────► Complete ◄──── (last event reached)
//! ```
//!
//! # Timer Invariant
//!
//! At most one timer is pending, held in `pending`. Every transition out of
//! `Running` cancels it first. Every timer is armed through [`Scheduler::arm`],
//! which asserts the slot is empty. An expiry whose id does not match the
//! pending timer is stale and ignored.
//!
//! # Remaining Wait
//!
//! Waits are tracked in *script time* (the gap between event offsets). The
//! real delay handed to the clock is script time divided by the speed. A
//! pending timer keeps its script-time wait and the clock time it was armed
//! at; on pause only the elapsed real time is converted to script time and
//! subtracted, so resuming (at any speed) neither restarts nor skips the
//! step, even when the real delay saturates at very slow speeds.

use replay_env::{Clock, TimerId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::script::Script;
use crate::speed::Speed;

/// Run mode of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Idle,
    Running,
    Paused,
    Complete,
}

impl RunMode {
    pub fn name(&self) -> &'static str {
        match self {
            RunMode::Idle => "idle",
            RunMode::Running => "running",
            RunMode::Paused => "paused",
            RunMode::Complete => "complete",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How long to wait between consecutive events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Pacing {
    /// Wait the gap between the two events' offsets
    #[default]
    Offsets,

    /// Wait the same script time before every event
    Fixed(Duration),
}

/// Configuration for a playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackConfig {
    /// Speed the playback starts with (default: 1x)
    pub initial_speed: Speed,

    /// Inter-step timing (default: offset gaps)
    pub pacing: Pacing,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            initial_speed: Speed::NORMAL,
            pacing: Pacing::Offsets,
        }
    }
}

/// Immutable view of the scheduler's state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Index of the current event, `None` before the first step
    pub index: Option<usize>,

    pub run_mode: RunMode,

    pub speed: Speed,

    /// Script-time wait left before the next event, if one is due
    pub remaining: Option<Duration>,
}

impl PlaybackState {
    /// Index as a signed position, -1 before the first step.
    pub fn position(&self) -> i64 {
        self.index.map(|i| i as i64).unwrap_or(-1)
    }
}

/// Outcome of a command.
///
/// `Ignored` means the command was not valid in the current state and
/// nothing changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Ignored,
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    id: TimerId,

    /// Clock time the timer was armed at
    armed_at: Duration,

    /// Script-time wait the timer covers
    wait: Duration,
}

impl PendingTimer {
    /// Script time still left at clock time `now`.
    fn remaining(&self, speed: Speed, now: Duration) -> Duration {
        let elapsed = speed.to_script(now.saturating_sub(self.armed_at));
        self.wait.saturating_sub(elapsed)
    }
}

/// The playback state machine.
///
/// Generic over the clock so the same scheduler runs against Tokio in
/// production and a virtual clock in tests.
pub struct Scheduler<C: Clock> {
    clock: C,
    script: Arc<Script>,
    pacing: Pacing,

    index: Option<usize>,
    mode: RunMode,
    speed: Speed,

    /// Script-time wait captured while not running
    remaining: Option<Duration>,

    /// The single outstanding timer
    pending: Option<PendingTimer>,
}

impl<C: Clock> Scheduler<C> {
    /// Creates an idle scheduler positioned before the first event.
    pub fn new(script: Arc<Script>, clock: C, config: PlaybackConfig) -> Self {
        Self {
            clock,
            script,
            pacing: config.pacing,
            index: None,
            mode: RunMode::Idle,
            speed: config.initial_speed,
            remaining: None,
            pending: None,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn script(&self) -> &Arc<Script> {
        &self.script
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn run_mode(&self) -> RunMode {
        self.mode
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    /// Id of the outstanding timer, if any.
    pub fn pending_timer(&self) -> Option<TimerId> {
        self.pending.map(|p| p.id)
    }

    /// Returns a snapshot of the current state.
    ///
    /// While running, `remaining` is computed live from the clock.
    pub fn state(&self) -> PlaybackState {
        let remaining = match self.pending {
            Some(pending) => Some(pending.remaining(self.speed, self.clock.now())),
            None => self.remaining,
        };

        PlaybackState {
            index: self.index,
            run_mode: self.mode,
            speed: self.speed,
            remaining,
        }
    }

    /// Starts (or replays) from the first event.
    ///
    /// The first event fires synchronously. Starting while running or
    /// paused is ignored; use `reset` first to restart.
    pub fn start(&mut self) -> Transition {
        match self.mode {
            RunMode::Idle | RunMode::Complete => {
                self.disarm();
                self.index = None;
                self.remaining = None;
                self.mode = RunMode::Running;
                info!("Playback started ({} events at {})", self.script.len(), self.speed);
                self.advance();
                Transition::Applied
            }
            RunMode::Running | RunMode::Paused => self.ignored("start"),
        }
    }

    /// Pauses a running playback, keeping the unelapsed part of the wait.
    pub fn pause(&mut self) -> Transition {
        if self.mode != RunMode::Running {
            return self.ignored("pause");
        }

        let left = self.disarm().unwrap_or_else(|| self.next_delay());
        self.remaining = Some(left);
        self.mode = RunMode::Paused;
        debug!("Paused at {} with {:?} left", self.state().position(), left);
        Transition::Applied
    }

    /// Resumes a paused playback with the wait captured at pause time.
    pub fn resume(&mut self) -> Transition {
        if self.mode != RunMode::Paused {
            return self.ignored("resume");
        }

        let wait = self.remaining.take().unwrap_or_else(|| self.next_delay());
        self.mode = RunMode::Running;
        self.arm(wait);
        Transition::Applied
    }

    /// Advances exactly one event without involving the clock.
    ///
    /// Leaves the playback paused, or complete if the last event was reached.
    pub fn step_forward(&mut self) -> Transition {
        match self.mode {
            RunMode::Idle | RunMode::Paused => {
                self.mode = RunMode::Paused;
                self.advance();
                Transition::Applied
            }
            RunMode::Running | RunMode::Complete => self.ignored("step_forward"),
        }
    }

    /// Changes the speed multiplier.
    ///
    /// A pending wait is rescaled by `old / new`, preserving how far into
    /// the current step playback already is.
    pub fn set_speed(&mut self, speed: Speed) -> Transition {
        if speed == self.speed {
            return self.ignored("set_speed");
        }

        let old = self.speed;
        let left = self.disarm();
        self.speed = speed;
        debug!("Speed {} -> {}", old, speed);

        if let Some(left) = left {
            self.arm(left);
        }
        Transition::Applied
    }

    /// Returns to idle before the first event. Always succeeds.
    pub fn reset(&mut self) -> Transition {
        self.disarm();
        self.index = None;
        self.remaining = None;
        self.mode = RunMode::Idle;
        info!("Playback reset");
        Transition::Applied
    }

    /// Delivers an expired timer.
    ///
    /// Only the pending timer advances playback; any other id is stale
    /// (cancelled by pause, reset or a speed change) and ignored.
    pub fn fire(&mut self, id: TimerId) -> Transition {
        match self.pending {
            Some(pending) if pending.id == id => {
                self.pending = None;
                self.advance();
                Transition::Applied
            }
            _ => {
                trace!("Ignoring stale {}", id);
                Transition::Ignored
            }
        }
    }

    /// Cancels the pending timer, if any.
    ///
    /// Returns the script time that was still left on it, at the current speed.
    fn disarm(&mut self) -> Option<Duration> {
        let pending = self.pending.take()?;
        self.clock.cancel(pending.id);
        Some(pending.remaining(self.speed, self.clock.now()))
    }

    /// Schedules the next step `wait` script time from now.
    fn arm(&mut self, wait: Duration) {
        debug_assert!(self.pending.is_none(), "second timer armed");
        self.disarm();

        let real = self.speed.to_real(wait);
        let id = self.clock.schedule(real);
        self.pending = Some(PendingTimer {
            id,
            armed_at: self.clock.now(),
            wait,
        });
        self.remaining = None;
        debug!("Armed {} for {:?} ({:?} script time)", id, real, wait);
    }

    /// Moves to the next event.
    ///
    /// Running playbacks arm the timer for the following step; paused
    /// ones record its full wait for a later resume.
    fn advance(&mut self) {
        let next = self.index.map_or(0, |i| i + 1);
        let Some(event) = self.script.event_at(next) else {
            // Unreachable with a validated script
            warn!("No event at index {}; completing playback", next);
            self.complete();
            return;
        };

        self.index = Some(next);
        debug!("Step {}: {} ({})", next, event.title, event.phase);

        if next + 1 >= self.script.len() {
            self.complete();
            return;
        }

        let wait = self.delay_before(next + 1);
        match self.mode {
            RunMode::Running => self.arm(wait),
            _ => self.remaining = Some(wait),
        }
    }

    fn complete(&mut self) {
        self.disarm();
        self.remaining = None;
        self.mode = RunMode::Complete;
        info!("Playback complete at {}", self.state().position());
    }

    /// Wait before the step after the current one.
    fn next_delay(&self) -> Duration {
        self.delay_before(self.index.map_or(0, |i| i + 1))
    }

    fn delay_before(&self, i: usize) -> Duration {
        match self.pacing {
            Pacing::Offsets => self.script.step_delay(i),
            Pacing::Fixed(wait) if i > 0 => wait,
            Pacing::Fixed(_) => Duration::ZERO,
        }
    }

    fn ignored(&self, command: &str) -> Transition {
        warn!("Ignoring {} while {}", command, self.mode);
        Transition::Ignored
    }
}

impl<C: Clock> Drop for Scheduler<C> {
    fn drop(&mut self) {
        self.disarm();
    }
}
