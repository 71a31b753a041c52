//! Virtual clock implementing Clock for deterministic testing.

use crate::clock::{Clock, TimerDriver};
use crate::timers::TimerTable;
use crate::types::TimerId;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Deterministic clock whose time moves only when told to.
///
/// This implements `Clock` using:
/// - A virtual "now" that starts at zero
/// - A deadline-ordered timer table
/// - A high-water mark of simultaneously pending timers
///
/// Clones share the same timeline, so a test can keep one handle while
/// the scheduler owns another.
#[derive(Clone, Default)]
pub struct VirtualClock {
    inner: Arc<Mutex<VirtualState>>,
}

#[derive(Default)]
struct VirtualState {
    /// Current virtual time since clock creation
    now: Duration,

    /// Pending timers
    timers: TimerTable,

    /// Most timers ever pending at once
    peak_pending: usize,
}

impl VirtualClock {
    /// Creates a new VirtualClock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, VirtualState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes and returns the earliest timer due at or before `limit`,
    /// moving time forward to its deadline.
    ///
    /// Returns `None` (leaving time untouched) if nothing is due by `limit`.
    /// Callers stepping through a window call this in a loop so that timers
    /// scheduled while handling an expiry still fire inside the window.
    pub fn pop_due(&self, limit: Duration) -> Option<TimerId> {
        let mut state = self.state();
        let (deadline, id) = state.timers.pop_due(limit)?;
        state.now = state.now.max(deadline);
        Some(id)
    }

    /// Moves time forward to `target` without firing anything.
    ///
    /// Time never moves backwards; an earlier target is ignored.
    pub fn advance_to(&self, target: Duration) {
        let mut state = self.state();
        state.now = state.now.max(target);
    }

    /// Returns the deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.state().timers.earliest().map(|(deadline, _)| deadline)
    }

    /// Returns the most timers that were ever pending at the same time.
    pub fn peak_pending(&self) -> usize {
        self.state().peak_pending
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        self.state().now
    }

    fn schedule(&self, delay: Duration) -> TimerId {
        let mut state = self.state();
        let deadline = state.now + delay;
        let id = state.timers.insert(deadline);
        state.peak_pending = state.peak_pending.max(state.timers.len());
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.state().timers.remove(id)
    }

    fn pending(&self) -> usize {
        self.state().timers.len()
    }
}

#[async_trait]
impl TimerDriver for VirtualClock {
    async fn next_expiry(&self) -> Option<TimerId> {
        // In simulation, waiting jumps virtual time to the deadline
        self.pop_due(Duration::MAX)
    }
}

impl std::fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("VirtualClock")
            .field("now", &state.now)
            .field("pending", &state.timers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_clock_time() {
        let clock = VirtualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);

        clock.advance_to(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(1));

        // Never backwards
        clock.advance_to(Duration::from_millis(500));
        assert_eq!(clock.now(), Duration::from_secs(1));
    }

    #[test]
    fn test_pop_due_moves_time_to_deadline() {
        let clock = VirtualClock::new();
        let id = clock.schedule(Duration::from_millis(300));

        assert_eq!(clock.pop_due(Duration::from_millis(299)), None);
        assert_eq!(clock.now(), Duration::ZERO);

        assert_eq!(clock.pop_due(Duration::from_secs(10)), Some(id));
        assert_eq!(clock.now(), Duration::from_millis(300));
    }

    #[test]
    fn test_schedule_is_relative_to_now() {
        let clock = VirtualClock::new();
        clock.advance_to(Duration::from_millis(1000));
        clock.schedule(Duration::from_millis(250));

        assert_eq!(clock.next_deadline(), Some(Duration::from_millis(1250)));
    }

    #[test]
    fn test_zero_delay_is_due_now() {
        let clock = VirtualClock::new();
        clock.advance_to(Duration::from_millis(40));
        let id = clock.schedule(Duration::ZERO);

        assert_eq!(clock.pop_due(clock.now()), Some(id));
        assert_eq!(clock.now(), Duration::from_millis(40));
    }

    #[test]
    fn test_clone_shares_timeline() {
        let clock1 = VirtualClock::new();
        let clock2 = clock1.clone();

        clock1.schedule(Duration::from_secs(5));
        clock1.advance_to(Duration::from_secs(2));

        // Both should see the same time and timers
        assert_eq!(clock1.now(), clock2.now());
        assert_eq!(clock2.pending(), 1);
    }

    #[test]
    fn test_peak_pending_tracks_high_water_mark() {
        let clock = VirtualClock::new();
        let a = clock.schedule(Duration::from_millis(1));
        let _b = clock.schedule(Duration::from_millis(2));
        clock.cancel(a);

        assert_eq!(clock.pending(), 1);
        assert_eq!(clock.peak_pending(), 2);
    }

    #[tokio::test]
    async fn test_next_expiry_jumps_time() {
        let clock = VirtualClock::new();
        let id = clock.schedule(Duration::from_secs(30));

        assert_eq!(clock.next_expiry().await, Some(id));
        assert_eq!(clock.now(), Duration::from_secs(30));
        assert_eq!(clock.next_expiry().await, None);
    }
}
