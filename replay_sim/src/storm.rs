//! Command storm - seeded random command sequences against a playback.
//!
//! Interleaves random commands with random stretches of virtual time and
//! checks the playback invariants after every action. The same seed always
//! produces the same sequence, so any failure is reproducible by seed.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use replay_core::{Command, Script, Speed};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::harness::{SimConfig, SimHarness};
use crate::runner::InvariantChecker;

/// Outcome of a storm run.
#[derive(Debug, Clone, Default)]
pub struct StormReport {
    /// Commands issued
    pub commands: u64,

    /// Commands the controller ignored
    pub ignored: u64,

    /// Timer expiries delivered
    pub expiries: u64,

    /// Virtual time covered
    pub elapsed: Duration,

    /// First invariant violation, if any
    pub violation: Option<String>,
}

/// Random command generator and runner.
pub struct CommandStorm {
    rng: ChaCha8Rng,
    script: Arc<Script>,
    actions: usize,
}

impl CommandStorm {
    /// Creates a storm of 500 actions.
    pub fn new(seed: u64, script: Arc<Script>) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            script,
            actions: 500,
        }
    }

    /// Sets the number of actions.
    pub fn with_actions(mut self, actions: usize) -> Self {
        self.actions = actions;
        self
    }

    fn random_speed(&mut self) -> Speed {
        const PRESETS: [Speed; 4] = [Speed::NORMAL, Speed::DOUBLE, Speed::QUAD, Speed::QUINTUPLE];

        if self.rng.gen_bool(0.7) {
            PRESETS[self.rng.gen_range(0..PRESETS.len())]
        } else {
            Speed::new(self.rng.gen_range(0.1..10.0)).unwrap_or_default()
        }
    }

    fn random_command(&mut self) -> Command {
        match self.rng.gen_range(0..100) {
            0..=14 => Command::Start,
            15..=34 => Command::Pause,
            35..=54 => Command::Resume,
            55..=74 => Command::StepForward,
            75..=89 => Command::SetSpeed(self.random_speed()),
            _ => Command::Reset,
        }
    }

    /// Runs the storm, stopping at the first invariant violation.
    pub fn run(mut self, config: SimConfig) -> StormReport {
        let mut harness = SimHarness::new(Arc::clone(&self.script), config);
        self.run_on(&mut harness)
    }

    /// Runs the storm against an existing harness.
    pub fn run_on(&mut self, harness: &mut SimHarness) -> StormReport {
        let mut report = StormReport::default();
        let mut checker = InvariantChecker::new();

        for action in 0..self.actions {
            if self.rng.gen_bool(0.6) {
                let command = self.random_command();
                report.commands += 1;
                if !harness.apply(command).is_applied() {
                    report.ignored += 1;
                }
            } else {
                let wait = Duration::from_millis(self.rng.gen_range(0..12_000));
                report.expiries += harness.advance(wait) as u64;
            }

            if let Err(violation) = checker.check(harness) {
                debug!("Violation after action {}: {}", action, violation);
                report.violation = Some(format!("action {}: {}", action, violation));
                break;
            }
        }

        report.elapsed = harness.time();
        report
    }
}
