//! Scenario runner - executes playback verification scenarios.

use crate::harness::{Notification, SimConfig, SimHarness};
use crate::scenarios::ScenarioId;
use crate::storm::CommandStorm;

use replay_core::{project, Command, RunMode, Script, Speed, Transition};
use replay_env::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tolerance for comparing rescaled real-time deadlines.
const SLACK: Duration = Duration::from_micros(1);

/// Upper bound on virtual time for any single run.
const HORIZON: Duration = Duration::from_secs(24 * 3600);

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Snapshots delivered to subscribers
    pub notifications: usize,

    /// Final virtual time in milliseconds
    pub final_time_ms: u64,

    /// Index at the end of the run
    pub final_index: Option<usize>,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    /// Commands issued
    pub commands: u64,

    /// Commands ignored as invalid in the current state
    pub ignored_commands: u64,

    /// Timer expiries delivered
    pub expiries: u64,

    /// Most timers pending at once
    pub peak_pending_timers: usize,
}

impl ScenarioMetrics {
    fn record(&mut self, outcome: Transition) {
        self.commands += 1;
        if !outcome.is_applied() {
            self.ignored_commands += 1;
        }
    }
}

/// Checks the playback invariants incrementally over a harness's log.
///
/// Every published snapshot must match a fresh projection of its index, and
/// consecutive snapshots may only stay put, step by one, restart at the
/// first event, or return to the start.
#[derive(Debug, Default)]
pub struct InvariantChecker {
    /// Notifications already verified
    checked: usize,

    /// Index of the last verified notification
    last_index: Option<usize>,
}

impl InvariantChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifies the harness state and any notifications since the last call.
    pub fn check(&mut self, harness: &SimHarness) -> Result<(), String> {
        let clock = harness.clock();
        if clock.peak_pending() > 1 {
            return Err(format!("{} timers pending at once", clock.peak_pending()));
        }

        let snapshot = harness.snapshot();
        let running = snapshot.run_mode() == RunMode::Running;
        if running != harness.pending_timer().is_some() {
            return Err(format!(
                "run mode {} with pending timer {:?}",
                snapshot.run_mode(),
                harness.pending_timer()
            ));
        }
        if clock.pending() != usize::from(harness.pending_timer().is_some()) {
            return Err(format!("clock holds {} timers", clock.pending()));
        }

        let script = harness.script();
        if snapshot.run_mode() == RunMode::Complete && snapshot.index() != Some(script.len() - 1) {
            return Err(format!("complete at index {:?}", snapshot.index()));
        }

        let log = harness.notifications();
        for note in log.iter().skip(self.checked) {
            let index = note.snapshot.index();
            let allowed = match (self.last_index, index) {
                (_, None) | (_, Some(0)) => true,
                (None, Some(_)) => false,
                (Some(prev), Some(i)) => i == prev || i == prev + 1,
            };
            if !allowed {
                return Err(format!("index jumped {:?} -> {:?}", self.last_index, index));
            }
            if note.snapshot.derived != project(script, index) {
                return Err(format!("stale derived state at index {:?}", index));
            }
            self.last_index = index;
        }
        self.checked = log.len();
        Ok(())
    }
}

/// Convenience wrapper for a one-shot check of a whole harness.
pub fn check_invariants(harness: &SimHarness) -> Result<(), String> {
    InvariantChecker::new().check(harness)
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(message())
    }
}

/// Runs verification scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Script under test
    script: Arc<Script>,

    /// Base playback speed
    speed: Speed,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, script: Arc<Script>) -> Self {
        Self {
            seed,
            script,
            speed: Speed::NORMAL,
        }
    }

    /// Sets the base playback speed.
    pub fn with_speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }

    fn harness(&self) -> SimHarness {
        let config = SimConfig {
            seed: self.seed,
            speed: self.speed,
            ..Default::default()
        };
        SimHarness::new(Arc::clone(&self.script), config)
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_recorded(scenario).0
    }

    /// Runs a scenario, also returning every notification it delivered.
    pub fn run_recorded(&self, scenario: ScenarioId) -> (ScenarioResult, Vec<Notification>) {
        info!("Starting scenario: {} (seed={}, speed={})", scenario.name(), self.seed, self.speed);

        let mut harness = self.harness();
        let mut metrics = ScenarioMetrics::default();

        let outcome = match scenario {
            ScenarioId::Playthrough => self.run_playthrough(&mut harness, &mut metrics),
            ScenarioId::PauseResume => self.run_pause_resume(&mut harness, &mut metrics),
            ScenarioId::SpeedShift => self.run_speed_shift(&mut harness, &mut metrics),
            ScenarioId::StepThrough => self.run_step_through(&mut harness, &mut metrics),
            ScenarioId::ResetMidflight => self.run_reset_midflight(&mut harness, &mut metrics),
            ScenarioId::CommandStorm => self.run_command_storm(&mut harness, &mut metrics),
        }
        .and_then(|_| check_invariants(&harness));

        if let Err(reason) = &outcome {
            warn!("{} failed: {}", scenario.name(), reason);
        }
        metrics.peak_pending_timers = metrics.peak_pending_timers.max(harness.clock().peak_pending());

        let log = harness.notifications();
        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: outcome.is_ok(),
            notifications: log.len(),
            final_time_ms: harness.time().as_millis() as u64,
            final_index: harness.snapshot().index(),
            failure_reason: outcome.err(),
            metrics,
        };
        (result, log)
    }

    /// PB-001: every event once, in order, exactly at its scaled offset.
    fn run_playthrough(&self, harness: &mut SimHarness, metrics: &mut ScenarioMetrics) -> Result<(), String> {
        metrics.record(harness.apply(Command::Start));
        metrics.expiries += harness.run_to_end(HORIZON) as u64;

        let snapshot = harness.snapshot();
        ensure(snapshot.run_mode() == RunMode::Complete, || {
            format!("ended {} instead of complete", snapshot.run_mode())
        })?;

        let log = harness.notifications();
        ensure(log.len() == self.script.len(), || {
            format!("{} notifications for {} events", log.len(), self.script.len())
        })?;

        let mut expected_at = Duration::ZERO;
        for (i, note) in log.iter().enumerate() {
            expected_at += self.speed.to_real(self.script.step_delay(i));
            ensure(note.snapshot.index() == Some(i), || {
                format!("notification {} carried index {:?}", i, note.snapshot.index())
            })?;
            ensure(note.at == expected_at, || {
                format!("event {} fired at {:?}, expected {:?}", i, note.at, expected_at)
            })?;
        }
        Ok(())
    }

    /// PB-002: pause halfway through every wait, sit idle, resume.
    fn run_pause_resume(&self, harness: &mut SimHarness, metrics: &mut ScenarioMetrics) -> Result<(), String> {
        metrics.record(harness.apply(Command::Start));

        while let Some(deadline) = harness.clock().next_deadline() {
            let index = harness.snapshot().index();
            let wait = deadline.saturating_sub(harness.time());
            let half = wait / 2;

            metrics.expiries += harness.advance(half) as u64;
            if harness.snapshot().index() != index {
                // Zero-length wait
                continue;
            }
            metrics.record(harness.apply(Command::Pause));
            ensure(harness.clock().pending() == 0, || "timer survived pause".to_string())?;

            harness.advance(Duration::from_secs(60));
            ensure(harness.snapshot().index() == index, || "advanced while paused".to_string())?;

            metrics.record(harness.apply(Command::Resume));
            let left = wait - half;
            let resumed_at = harness.time();
            if left > SLACK {
                harness.advance_to(resumed_at + left - SLACK);
                ensure(harness.snapshot().index() == index, || {
                    format!("step after {:?} fired early after resume", index)
                })?;
            }
            metrics.expiries += harness.advance_to(resumed_at + left + SLACK) as u64;
            ensure(harness.snapshot().index() != index, || {
                format!("step after {:?} did not fire after resume", index)
            })?;
            debug!("Resumed step {:?} after {:?}", harness.snapshot().index(), left);
        }

        ensure(harness.snapshot().run_mode() == RunMode::Complete, || "did not complete".to_string())
    }

    /// PB-003: double or halve the speed partway through every wait.
    fn run_speed_shift(&self, harness: &mut SimHarness, metrics: &mut ScenarioMetrics) -> Result<(), String> {
        let fast = Speed::new(self.speed.get() * 2.0).map_err(|e| e.to_string())?;
        metrics.record(harness.apply(Command::Start));

        while let Some(deadline) = harness.clock().next_deadline() {
            let current = harness.snapshot().playback.speed;
            let next = if current == fast { self.speed } else { fast };

            let index = harness.snapshot().index();
            let elapsed = deadline.saturating_sub(harness.time()) * 2 / 5;
            metrics.expiries += harness.advance(elapsed) as u64;
            if harness.snapshot().index() != index {
                continue;
            }
            let left = deadline.saturating_sub(harness.time());

            metrics.record(harness.apply(Command::SetSpeed(next)));
            let expected = harness.time() + next.to_real(current.to_script(left));
            let rescheduled = harness.clock().next_deadline().unwrap_or_default();
            ensure(rescheduled.abs_diff(expected) <= SLACK, || {
                format!("rescheduled to {:?}, expected {:?}", rescheduled, expected)
            })?;

            metrics.expiries += harness.advance_to(rescheduled) as u64;
            ensure(harness.snapshot().index() != index, || {
                format!("step after {:?} did not fire at its rescaled deadline", index)
            })?;
        }

        ensure(harness.snapshot().run_mode() == RunMode::Complete, || "did not complete".to_string())
    }

    /// PB-004: step_forward through the whole script.
    fn run_step_through(&self, harness: &mut SimHarness, metrics: &mut ScenarioMetrics) -> Result<(), String> {
        for i in 0..self.script.len() {
            let outcome = harness.apply(Command::StepForward);
            metrics.record(outcome);
            ensure(outcome.is_applied(), || format!("step {} ignored", i))?;

            let snapshot = harness.snapshot();
            ensure(snapshot.index() == Some(i), || {
                format!("step {} landed on {:?}", i, snapshot.index())
            })?;
            ensure(harness.clock().pending() == 0, || format!("step {} armed a timer", i))?;

            let expected = if i + 1 == self.script.len() { RunMode::Complete } else { RunMode::Paused };
            ensure(snapshot.run_mode() == expected, || {
                format!("step {} left {} instead of {}", i, snapshot.run_mode(), expected)
            })?;
        }

        let outcome = harness.apply(Command::StepForward);
        metrics.record(outcome);
        ensure(!outcome.is_applied(), || "stepped past the end".to_string())
    }

    /// PB-005: reset with a timer pending, then force the stale expiry.
    fn run_reset_midflight(&self, harness: &mut SimHarness, metrics: &mut ScenarioMetrics) -> Result<(), String> {
        metrics.record(harness.apply(Command::Start));
        if let Some(deadline) = harness.clock().next_deadline() {
            harness.advance(deadline.saturating_sub(harness.time()) / 2);
        }
        let stale = harness.pending_timer();

        metrics.record(harness.apply(Command::Reset));
        let snapshot = harness.snapshot();
        ensure(snapshot.run_mode() == RunMode::Idle && snapshot.playback.position() == -1, || {
            format!("reset left {} at {}", snapshot.run_mode(), snapshot.playback.position())
        })?;
        ensure(harness.clock().pending() == 0, || "timer survived reset".to_string())?;

        let before = harness.notification_count();
        if let Some(id) = stale {
            ensure(!harness.controller().fire(id).is_applied(), || "stale timer advanced playback".to_string())?;
        }
        harness.advance(Duration::from_secs(3600));
        ensure(harness.notification_count() == before, || "notified after reset".to_string())?;

        // Replays cleanly afterwards
        metrics.record(harness.apply(Command::Start));
        metrics.expiries += harness.run_to_end(HORIZON) as u64;
        ensure(harness.snapshot().run_mode() == RunMode::Complete, || "replay did not complete".to_string())
    }

    /// PB-006: seeded random command storm.
    fn run_command_storm(&self, harness: &mut SimHarness, metrics: &mut ScenarioMetrics) -> Result<(), String> {
        let report = CommandStorm::new(self.seed, Arc::clone(&self.script)).run_on(harness);

        metrics.commands += report.commands;
        metrics.ignored_commands += report.ignored;
        metrics.expiries += report.expiries;

        match report.violation {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::payment_service_outage;
    use replay_core::{AgentId, Phase, TimelineEvent};

    fn runner(speed: Speed) -> ScenarioRunner {
        ScenarioRunner::new(42, Arc::new(payment_service_outage().unwrap())).with_speed(speed)
    }

    #[test]
    fn test_all_scenarios_pass_on_demo() {
        for speed in [Speed::NORMAL, Speed::DOUBLE, Speed::QUINTUPLE] {
            let runner = runner(speed);
            for scenario in ScenarioId::all() {
                let result = runner.run(scenario);
                assert!(result.passed, "{} at {}: {:?}", scenario, speed, result.failure_reason);
                assert!(result.metrics.peak_pending_timers <= 1);
            }
        }
    }

    #[test]
    fn test_playthrough_metrics() {
        let result = runner(Speed::NORMAL).run(ScenarioId::Playthrough);

        assert!(result.passed);
        assert_eq!(result.notifications, 15);
        assert_eq!(result.final_index, Some(14));
        assert_eq!(result.final_time_ms, 115_000);
        assert_eq!(result.metrics.expiries, 14);
    }

    #[test]
    fn test_reset_midflight_reports_idle_replay() {
        let result = runner(Speed::DOUBLE).run(ScenarioId::ResetMidflight);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.final_index, Some(14));
    }

    #[test]
    fn test_scenarios_handle_simultaneous_events() {
        let events = vec![
            TimelineEvent::new("a", 0, None, Phase::Alert, "a"),
            TimelineEvent::new("b", 3000, Some(AgentId::Triage), Phase::Triage, "b"),
            TimelineEvent::new("c", 3000, Some(AgentId::Diagnosis), Phase::Diagnosis, "c"),
            TimelineEvent::new("d", 4000, Some(AgentId::Communication), Phase::Communication, "d"),
        ];
        let script = Arc::new(Script::load(events, vec![]).unwrap());
        let runner = ScenarioRunner::new(1, script);

        for scenario in ScenarioId::all() {
            let result = runner.run(scenario);
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
        }
    }

    #[test]
    fn test_checker_flags_double_timer() {
        let mut harness = SimHarness::new(
            Arc::new(payment_service_outage().unwrap()),
            SimConfig::default(),
        );
        harness.apply(Command::Start);
        harness.clock().schedule(Duration::from_secs(1));

        assert!(check_invariants(&harness).is_err());
    }
}
