//! Deadline-ordered timer table shared by the clock implementations.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::types::TimerId;

/// Pending one-shot timers keyed by deadline.
///
/// Ordering is `(deadline, id)`, so timers with equal deadlines expire in
/// the order they were scheduled.
#[derive(Debug, Default)]
pub(crate) struct TimerTable {
    /// Pending timers, earliest first
    queue: BTreeSet<(Duration, TimerId)>,

    /// Deadline lookup for cancellation
    deadlines: HashMap<TimerId, Duration>,

    /// Next id to hand out
    next_id: u64,
}

impl TimerTable {
    /// Inserts a timer due at `deadline` and returns its id.
    pub(crate) fn insert(&mut self, deadline: Duration) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.queue.insert((deadline, id));
        self.deadlines.insert(id, deadline);
        id
    }

    /// Removes a pending timer. Returns `false` if it was not pending.
    pub(crate) fn remove(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => self.queue.remove(&(deadline, id)),
            None => false,
        }
    }

    /// Returns the earliest pending timer without removing it.
    pub(crate) fn earliest(&self) -> Option<(Duration, TimerId)> {
        self.queue.first().copied()
    }

    /// Removes and returns the earliest timer if it is due at or before `limit`.
    pub(crate) fn pop_due(&mut self, limit: Duration) -> Option<(Duration, TimerId)> {
        let (deadline, id) = self.earliest()?;
        if deadline > limit {
            return None;
        }
        self.remove(id);
        Some((deadline, id))
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}
