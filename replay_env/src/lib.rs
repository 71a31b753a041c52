//! Incident Replay Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" clock abstraction allowing the playback
//! scheduler to run against both **Production** (tokio) and **Simulation**
//! (virtual time) clocks.
//!
//! # Core Concept: Handles, not Callbacks
//!
//! A clock never calls back into the scheduler. Scheduling returns a
//! [`TimerId`]; whoever drives the clock hands expired ids back to the
//! scheduler. The scheduler keeps exactly one pending id and ignores any
//! other, so a stale expiry can never advance playback.
//!
//! - Time (`now()`)
//! - One-shot timers (`schedule()`, `cancel()`)
//! - Expiry delivery (`TimerDriver::next_expiry()`)
//!
//! # Example
//!
//! ```ignore
//! use replay_env::{Clock, TimerDriver, VirtualClock};
//!
//! async fn drive<C: TimerDriver>(clock: &C, controller: &mut Controller<C>) {
//!     while let Some(id) = clock.next_expiry().await {
//!         controller.fire(id);
//!     }
//! }
//! ```

mod clock;
mod timers;
mod types;
mod tokio_impl;
mod virtual_impl;

pub use clock::{Clock, TimerDriver};
pub use types::TimerId;
pub use tokio_impl::TokioClock;
pub use virtual_impl::VirtualClock;
