//! JSON exporter for playback traces.
//!
//! Exports every snapshot a run delivered as a frame, so a UI can be driven
//! from (or diffed against) a recorded trace.

use crate::harness::Notification;
use crate::runner::ScenarioResult;
use replay_core::{AgentId, AgentStatus, IncidentMetrics, Phase, RunMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// A single delivered snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackFrame {
    /// Virtual time of delivery in milliseconds
    pub time_ms: u64,

    /// Script position, -1 before the first event
    pub index: i64,

    pub run_mode: RunMode,

    pub phase: Phase,

    /// Status of every agent
    pub agents: BTreeMap<AgentId, AgentStatus>,

    /// Ids of the messages visible at this position
    pub visible_messages: Vec<String>,

    /// Incident counters at this position
    pub metrics: IncidentMetrics,

    /// Title of the current event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl From<&Notification> for PlaybackFrame {
    fn from(note: &Notification) -> Self {
        let snapshot = &note.snapshot;
        Self {
            time_ms: note.at.as_millis() as u64,
            index: snapshot.playback.position(),
            run_mode: snapshot.run_mode(),
            phase: snapshot.phase(),
            agents: snapshot.agent_statuses().clone(),
            visible_messages: snapshot.visible_messages().iter().map(|m| m.id.clone()).collect(),
            metrics: snapshot.derived.metrics,
            event: snapshot.derived.current_event.as_ref().map(|e| e.title.clone()),
        }
    }
}

/// Complete playback export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in milliseconds
    pub duration_ms: u64,

    /// All frames
    pub frames: Vec<PlaybackFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl PlaybackExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_ms: 0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: PlaybackFrame) {
        self.duration_ms = self.duration_ms.max(frame.time_ms);
        self.frames.push(frame);
    }

    /// Adds a frame per notification.
    pub fn extend(&mut self, notifications: &[Notification]) {
        for note in notifications {
            self.add_frame(PlaybackFrame::from(note));
        }
    }

    /// Finalizes the export from a scenario result.
    pub fn finalize(&mut self, result: &ScenarioResult) {
        self.passed = result.passed;
        self.failure_reason = result.failure_reason.clone();
        self.duration_ms = self.duration_ms.max(result.final_time_ms);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::payment_service_outage;
    use crate::harness::{SimConfig, SimHarness};
    use replay_core::Command;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_export_frames_follow_notifications() {
        let mut harness = SimHarness::new(
            Arc::new(payment_service_outage().unwrap()),
            SimConfig::default(),
        );
        harness.apply(Command::Start);
        harness.advance(Duration::from_secs(16));
        harness.apply(Command::Reset);

        let mut export = PlaybackExport::new("manual", 42);
        export.extend(&harness.notifications());

        let indices: Vec<i64> = export.frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2, -1]);
        assert_eq!(export.duration_ms, 16_000);
        assert_eq!(export.frames[1].time_ms, 8_000);
        assert_eq!(export.frames[3].run_mode, RunMode::Idle);
        assert!(export.frames[3].event.is_none());
    }

    #[test]
    fn test_export_json_shape() {
        let mut harness = SimHarness::new(
            Arc::new(payment_service_outage().unwrap()),
            SimConfig::default(),
        );
        harness.apply(Command::StepForward);

        let mut export = PlaybackExport::new("manual", 7);
        export.extend(&harness.notifications());
        let json = serde_json::to_value(&export).unwrap();

        assert_eq!(json["frames"][0]["index"], 0);
        assert_eq!(json["frames"][0]["run_mode"], "paused");
        assert_eq!(json["frames"][0]["phase"], "alert");
        assert_eq!(json["frames"][0]["metrics"]["elapsed_ms"], 0);
        assert!(json.get("failure_reason").is_none());
    }
}
