//! Production implementation of Clock using Tokio.

use crate::clock::{Clock, TimerDriver};
use crate::timers::TimerTable;
use crate::types::TimerId;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Production clock backed by Tokio timers.
///
/// This is the "real" implementation used for live playback.
/// Time comes from `tokio::time::Instant`, so tests running with a
/// paused Tokio runtime see auto-advanced time instead of real delays.
pub struct TokioClock {
    /// Start time for monotonic duration calculations
    start: Instant,

    /// Pending timers as deadlines relative to `start`
    timers: Mutex<TimerTable>,
}

impl TokioClock {
    /// Creates a new TokioClock.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            timers: Mutex::new(TimerTable::default()),
        }
    }

    /// Creates an Arc-wrapped clock for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn timers(&self) -> MutexGuard<'_, TimerTable> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn schedule(&self, delay: Duration) -> TimerId {
        let deadline = self.now() + delay;
        self.timers().insert(deadline)
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.timers().remove(id)
    }

    fn pending(&self) -> usize {
        self.timers().len()
    }
}

#[async_trait]
impl TimerDriver for TokioClock {
    async fn next_expiry(&self) -> Option<TimerId> {
        // Lock is released before sleeping
        let (deadline, id) = self.timers().earliest()?;
        tokio::time::sleep_until(self.start + deadline).await;

        // A cancel while we slept means the caller dropped interest in `id`;
        // handing it out anyway is harmless because the scheduler ignores
        // ids it is not waiting for.
        self.timers().remove(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_fires_earliest_first() {
        let clock = TokioClock::new();
        let late = clock.schedule(Duration::from_millis(50));
        let early = clock.schedule(Duration::from_millis(10));

        assert_eq!(clock.next_expiry().await, Some(early));
        assert!(clock.now() >= Duration::from_millis(10));
        assert_eq!(clock.next_expiry().await, Some(late));
        assert!(clock.now() >= Duration::from_millis(50));
        assert_eq!(clock.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_cancelled_timer_never_fires() {
        let clock = TokioClock::new();
        let id = clock.schedule(Duration::from_millis(10));

        assert!(clock.cancel(id));
        assert_eq!(clock.next_expiry().await, None);
    }

    #[test]
    fn test_tokio_clock_cancel_unknown() {
        let clock = TokioClock::new();
        assert!(!clock.cancel(TimerId(99)));
    }
}
