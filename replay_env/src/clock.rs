//! Core clock traits for the playback scheduler.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::types::TimerId;

/// The central interface for wall-clock interaction.
///
/// This trait abstracts time so that the playback scheduler can run
/// against a real clock or a fully deterministic virtual one.
///
/// # Implementations
///
/// - **Production**: `TokioClock` - wraps `tokio::time`
/// - **Simulation**: `VirtualClock` - time moves only when told to
///
/// # Timers
///
/// Timers are one-shot. `schedule` hands back a [`TimerId`]; the clock
/// does not run any code when the timer expires. Expired ids are handed
/// out by [`TimerDriver::next_expiry`] (or by the virtual clock's manual
/// stepping API) and the caller routes them to the scheduler.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current monotonic time since clock creation.
    fn now(&self) -> Duration;

    /// Schedules a one-shot timer due `delay` from now.
    ///
    /// A zero delay is due immediately, but is still only delivered
    /// through the expiry path, never synchronously.
    fn schedule(&self, delay: Duration) -> TimerId;

    /// Cancels a pending timer.
    ///
    /// Returns `false` if the timer already expired or was never scheduled.
    fn cancel(&self, id: TimerId) -> bool;

    /// Returns the number of timers still pending.
    fn pending(&self) -> usize;
}

/// A clock that can wait for its own timers.
///
/// # Blocking
///
/// `next_expiry` suspends until the earliest pending timer is due, removes
/// it and returns its id. When nothing is pending it returns `None`
/// immediately rather than waiting forever.
#[async_trait]
pub trait TimerDriver: Clock {
    /// Waits for the next timer to expire.
    async fn next_expiry(&self) -> Option<TimerId>;
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn schedule(&self, delay: Duration) -> TimerId {
        (**self).schedule(delay)
    }

    fn cancel(&self, id: TimerId) -> bool {
        (**self).cancel(id)
    }

    fn pending(&self) -> usize {
        (**self).pending()
    }
}

#[async_trait]
impl<T: TimerDriver + ?Sized> TimerDriver for Arc<T> {
    async fn next_expiry(&self) -> Option<TimerId> {
        (**self).next_expiry().await
    }
}
