//! SimHarness - a playback controller running on virtual time.

use replay_core::{
    Command, Pacing, PlaybackConfig, PlaybackController, Script, Snapshot, Speed, Transition,
};
use replay_env::{Clock, TimerId, VirtualClock};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Configuration for a simulated playback.
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Master seed for randomized scenarios
    pub seed: u64,

    /// Initial playback speed
    pub speed: Speed,

    /// Inter-step timing
    pub pacing: Pacing,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            speed: Speed::NORMAL,
            pacing: Pacing::Offsets,
        }
    }
}

/// A snapshot delivered to subscribers, stamped with virtual time.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Virtual time the notification was delivered
    pub at: Duration,

    pub snapshot: Snapshot,
}

/// The SimHarness - controller, virtual clock and notification log.
///
/// Every snapshot the controller publishes is recorded, so scenarios can
/// assert on the exact sequence subscribers saw.
pub struct SimHarness {
    /// Configuration
    pub config: SimConfig,

    /// Shared virtual clock (the controller holds a clone)
    clock: VirtualClock,

    controller: PlaybackController<VirtualClock>,

    /// Everything subscribers were told, in order
    log: Arc<Mutex<Vec<Notification>>>,
}

impl SimHarness {
    /// Creates a harness over `script` with a recording subscriber attached.
    pub fn new(script: Arc<Script>, config: SimConfig) -> Self {
        let clock = VirtualClock::new();
        let playback = PlaybackConfig {
            initial_speed: config.speed,
            pacing: config.pacing,
        };
        let mut controller = PlaybackController::new(script, clock.clone(), playback);

        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let stamp = clock.clone();
        controller.subscribe(move |snapshot: &Snapshot| {
            lock(&sink).push(Notification {
                at: stamp.now(),
                snapshot: snapshot.clone(),
            });
        });

        Self {
            config,
            clock,
            controller,
            log,
        }
    }

    pub fn controller(&mut self) -> &mut PlaybackController<VirtualClock> {
        &mut self.controller
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    pub fn script(&self) -> &Arc<Script> {
        self.controller.script()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.controller.snapshot()
    }

    /// Id of the controller's outstanding timer.
    pub fn pending_timer(&self) -> Option<TimerId> {
        self.controller.pending_timer()
    }

    /// Applies a command at the current virtual time.
    pub fn apply(&mut self, command: Command) -> Transition {
        debug!("t={:?} | {}", self.clock.now(), command);
        self.controller.apply(command)
    }

    /// Moves virtual time forward by `by`, firing every timer that falls due.
    ///
    /// Timers scheduled while handling an expiry still fire inside the
    /// window. Returns the number of expiries delivered.
    pub fn advance(&mut self, by: Duration) -> usize {
        let target = self.clock.now() + by;
        self.advance_to(target)
    }

    /// Moves virtual time forward to `target`. See [`SimHarness::advance`].
    pub fn advance_to(&mut self, target: Duration) -> usize {
        let mut fired = 0;
        while let Some(id) = self.clock.pop_due(target) {
            self.controller.fire(id);
            fired += 1;
        }
        self.clock.advance_to(target);
        fired
    }

    /// Fires timers until none is pending or `limit` virtual time passes.
    ///
    /// Returns the number of expiries delivered.
    pub fn run_to_end(&mut self, limit: Duration) -> usize {
        let deadline = self.clock.now() + limit;
        let mut fired = 0;
        while let Some(id) = self.clock.pop_due(deadline) {
            self.controller.fire(id);
            fired += 1;
        }
        fired
    }

    /// Returns the current virtual time.
    pub fn time(&self) -> Duration {
        self.clock.now()
    }

    /// Returns a copy of every notification so far.
    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.log).clone()
    }

    pub fn notification_count(&self) -> usize {
        lock(&self.log).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::payment_service_outage;
    use replay_core::RunMode;

    fn harness(speed: Speed) -> SimHarness {
        let config = SimConfig {
            speed,
            ..Default::default()
        };
        SimHarness::new(Arc::new(payment_service_outage().unwrap()), config)
    }

    #[test]
    fn test_sim_harness_creation() {
        let harness = harness(Speed::NORMAL);

        assert_eq!(harness.time(), Duration::ZERO);
        assert_eq!(harness.notification_count(), 0);
        assert_eq!(harness.snapshot().run_mode(), RunMode::Idle);
    }

    #[test]
    fn test_sim_harness_stamps_notifications() {
        let mut harness = harness(Speed::NORMAL);
        harness.apply(Command::Start);
        harness.advance(Duration::from_secs(10));

        let log = harness.notifications();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].at, Duration::ZERO);
        assert_eq!(log[1].at, Duration::from_secs(8));
        assert_eq!(harness.time(), Duration::from_secs(10));
    }

    #[test]
    fn test_sim_harness_runs_to_end() {
        let mut harness = harness(Speed::QUINTUPLE);
        harness.apply(Command::Start);
        let fired = harness.run_to_end(Duration::from_secs(3600));

        assert_eq!(fired, 14);
        assert_eq!(harness.snapshot().run_mode(), RunMode::Complete);
        assert_eq!(harness.time(), Duration::from_secs(23));
    }
}
