//! Incident Replay Deterministic Simulation Harness
//!
//! This crate runs the playback controller on a virtual clock, where every
//! timer fires exactly at its deadline and a whole replay takes no real
//! time. Scenarios assert on the exact sequence of snapshots subscribers
//! saw, and a seeded command storm hunts for ordering or timer bugs.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                  SimHarness                   │
//! │  ┌──────────────┐   fire(id)  ┌────────────┐  │
//! │  │ VirtualClock │────────────►│ Controller │  │
//! │  └──────────────┘◄────────────└─────┬──────┘  │
//! │          schedule / cancel          │         │
//! │                              ┌──────▼──────┐  │
//! │                              │ Notification│  │
//! │                              │     log     │  │
//! │                              └─────────────┘  │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use replay_sim::{demo, ScenarioRunner, ScenarioId};
//! use std::sync::Arc;
//!
//! let script = Arc::new(demo::payment_service_outage()?);
//! let result = ScenarioRunner::new(42, script).run(ScenarioId::PauseResume);
//! assert!(result.passed);
//! ```

pub mod demo;
pub mod driver;
mod error;
mod exporter;
mod harness;
mod runner;
pub mod scenarios;
mod storm;

pub use error::SimError;
pub use exporter::{PlaybackExport, PlaybackFrame};
pub use harness::{Notification, SimConfig, SimHarness};
pub use runner::{check_invariants, InvariantChecker, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use storm::{CommandStorm, StormReport};

use replay_core::Script;
use std::path::Path;

/// Loads a script from a JSON file.
pub fn load_script(path: impl AsRef<Path>) -> Result<Script, SimError> {
    let json = std::fs::read_to_string(path)?;
    Ok(Script::from_json(&json)?)
}
