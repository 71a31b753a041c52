//! State projector - derives UI state from a script position.
//!
//! [`project`] is a pure function of `(script, index)`. Nothing is carried
//! over from the previous position, so recomputing any index in any order
//! always gives the same answer.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::model::{A2AMessage, AgentId, AgentStatus, MessageKind, Phase, TimelineEvent};
use crate::script::Script;

/// Per-agent activity up to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentStats {
    /// Events at which the agent was the active one
    pub steps_active: u32,

    /// Duration of the agent's latest timed step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_duration_ms: Option<u64>,
}

/// Incident counters up to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IncidentMetrics {
    /// Visible agent-to-agent messages
    pub messages: usize,

    /// Visible events that invoked a tool
    pub tool_calls: usize,

    /// Visible messages of kind `action`
    pub actions: usize,

    /// Script time of the current event
    pub elapsed_ms: u64,
}

/// UI-facing state at a playback position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedState {
    /// Current incident phase
    pub phase: Phase,

    /// Status of every agent, in pipeline order
    pub agents: BTreeMap<AgentId, AgentStatus>,

    /// Messages with offset <= the current event's offset
    pub visible_messages: Vec<A2AMessage>,

    /// Events `0..=index`
    pub visible_events: Vec<TimelineEvent>,

    /// The event at the current index
    pub current_event: Option<TimelineEvent>,

    /// Offset of the current event once the incident is resolved
    pub resolved_at_ms: Option<u64>,

    /// Activity of every agent, in pipeline order
    pub agent_stats: BTreeMap<AgentId, AgentStats>,

    pub metrics: IncidentMetrics,
}

impl DerivedState {
    /// State before playback starts: alert phase, everyone idle, nothing visible.
    pub fn initial() -> Self {
        Self {
            phase: Phase::Alert,
            agents: AgentId::ALL.iter().map(|a| (*a, AgentStatus::Idle)).collect(),
            visible_messages: Vec::new(),
            visible_events: Vec::new(),
            current_event: None,
            resolved_at_ms: None,
            agent_stats: AgentId::ALL.iter().map(|a| (*a, AgentStats::default())).collect(),
            metrics: IncidentMetrics::default(),
        }
    }

    pub fn status(&self, agent: AgentId) -> AgentStatus {
        self.agents.get(&agent).copied().unwrap_or(AgentStatus::Idle)
    }

    /// The agent currently marked active, if any.
    pub fn active_agent(&self) -> Option<AgentId> {
        self.agents
            .iter()
            .find(|(_, status)| **status == AgentStatus::Active)
            .map(|(agent, _)| *agent)
    }
}

impl Default for DerivedState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Projects the derived state at `index`.
///
/// `None` (not started) and indices past the end both yield
/// [`DerivedState::initial`]; the scheduler never asks for the latter.
pub fn project(script: &Script, index: Option<usize>) -> DerivedState {
    let Some((index, event)) = index.and_then(|i| script.event_at(i).map(|e| (i, e))) else {
        return DerivedState::initial();
    };

    let is_last = index + 1 == script.len();
    let phase = match event.agent {
        Some(agent) if agent == AgentId::TERMINAL && is_last => Phase::Resolved,
        _ => event.phase,
    };

    let seen: HashSet<AgentId> = script.events()[..=index]
        .iter()
        .filter_map(|e| e.agent)
        .collect();

    // Without an active agent every agent seen so far counts as done
    let threshold = event.agent.map(|a| a.rank()).unwrap_or(u8::MAX);

    let agents = AgentId::ALL
        .iter()
        .map(|agent| {
            let status = if event.agent == Some(*agent) {
                AgentStatus::Active
            } else if seen.contains(agent) && agent.rank() < threshold {
                AgentStatus::Complete
            } else {
                AgentStatus::Idle
            };
            (*agent, status)
        })
        .collect();

    let visible = &script.events()[..=index];
    let visible_messages: Vec<A2AMessage> = script
        .messages_up_to(event.offset_ms)
        .into_iter()
        .cloned()
        .collect();

    let metrics = IncidentMetrics {
        messages: visible_messages.len(),
        tool_calls: visible.iter().filter(|e| e.tool.is_some()).count(),
        actions: visible_messages
            .iter()
            .filter(|m| m.kind == MessageKind::Action)
            .count(),
        elapsed_ms: event.offset_ms,
    };

    DerivedState {
        phase,
        agents,
        agent_stats: agent_stats(visible),
        metrics,
        visible_messages,
        visible_events: visible.to_vec(),
        current_event: Some(event.clone()),
        resolved_at_ms: (phase == Phase::Resolved).then_some(event.offset_ms),
    }
}

fn agent_stats(events: &[TimelineEvent]) -> BTreeMap<AgentId, AgentStats> {
    let mut stats: BTreeMap<AgentId, AgentStats> =
        AgentId::ALL.iter().map(|a| (*a, AgentStats::default())).collect();

    for event in events {
        let Some(entry) = event.agent.and_then(|a| stats.get_mut(&a)) else {
            continue;
        };
        entry.steps_active += 1;
        if event.duration_ms.is_some() {
            entry.last_duration_ms = event.duration_ms;
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Endpoint, MessageKind};
    use proptest::prelude::*;

    fn pipeline_script() -> Script {
        let events = vec![
            TimelineEvent::new("evt-1", 0, None, Phase::Alert, "Alarm"),
            TimelineEvent::new("evt-2", 1000, Some(AgentId::Triage), Phase::Triage, "Triage"),
            TimelineEvent::new("evt-3", 2000, Some(AgentId::Diagnosis), Phase::Diagnosis, "Diagnose"),
            TimelineEvent::new("evt-4", 3000, Some(AgentId::Remediation), Phase::Remediation, "Fix"),
            TimelineEvent::new("evt-5", 4000, Some(AgentId::Communication), Phase::Communication, "Report"),
        ];
        let messages = vec![
            A2AMessage::new("msg-1", 1000, Endpoint::External, Endpoint::Agent(AgentId::Triage), MessageKind::Handoff, "alarm"),
            A2AMessage::new("msg-2", 2000, Endpoint::Agent(AgentId::Triage), Endpoint::Agent(AgentId::Diagnosis), MessageKind::Handoff, "P1"),
            A2AMessage::new("msg-3", 2500, Endpoint::Agent(AgentId::Diagnosis), Endpoint::Agent(AgentId::Diagnosis), MessageKind::Query, "esql"),
            A2AMessage::new("msg-4", 4000, Endpoint::Agent(AgentId::Remediation), Endpoint::Agent(AgentId::Communication), MessageKind::Handoff, "done"),
        ];
        Script::load(events, messages).unwrap()
    }

    #[test]
    fn test_not_started() {
        let state = project(&pipeline_script(), None);

        assert_eq!(state.phase, Phase::Alert);
        assert!(state.agents.values().all(|s| *s == AgentStatus::Idle));
        assert!(state.visible_messages.is_empty());
        assert!(state.current_event.is_none());
    }

    #[test]
    fn test_active_and_complete_by_rank() {
        let state = project(&pipeline_script(), Some(3));

        assert_eq!(state.phase, Phase::Remediation);
        assert_eq!(state.status(AgentId::Triage), AgentStatus::Complete);
        assert_eq!(state.status(AgentId::Diagnosis), AgentStatus::Complete);
        assert_eq!(state.status(AgentId::Remediation), AgentStatus::Active);
        assert_eq!(state.status(AgentId::Communication), AgentStatus::Idle);
        assert_eq!(state.active_agent(), Some(AgentId::Remediation));
    }

    #[test]
    fn test_unseen_lower_rank_stays_idle() {
        // Diagnosis jumps straight in without triage ever appearing
        let events = vec![
            TimelineEvent::new("evt-1", 0, Some(AgentId::Diagnosis), Phase::Diagnosis, "Diagnose"),
        ];
        let script = Script::load(events, vec![]).unwrap();
        let state = project(&script, Some(0));

        assert_eq!(state.status(AgentId::Triage), AgentStatus::Idle);
        assert_eq!(state.status(AgentId::Diagnosis), AgentStatus::Active);
    }

    #[test]
    fn test_higher_rank_seen_earlier_is_idle() {
        let events = vec![
            TimelineEvent::new("evt-1", 0, Some(AgentId::Remediation), Phase::Remediation, "Fix"),
            TimelineEvent::new("evt-2", 10, Some(AgentId::Triage), Phase::Triage, "Re-triage"),
        ];
        let script = Script::load(events, vec![]).unwrap();
        let state = project(&script, Some(1));

        assert_eq!(state.status(AgentId::Remediation), AgentStatus::Idle);
        assert_eq!(state.status(AgentId::Triage), AgentStatus::Active);
    }

    #[test]
    fn test_terminal_agent_on_last_event_resolves() {
        let state = project(&pipeline_script(), Some(4));

        assert_eq!(state.phase, Phase::Resolved);
        assert_eq!(state.resolved_at_ms, Some(4000));
        assert_eq!(state.status(AgentId::Communication), AgentStatus::Active);
        assert_eq!(state.status(AgentId::Remediation), AgentStatus::Complete);
    }

    #[test]
    fn test_terminal_agent_before_end_keeps_phase() {
        let mut events = pipeline_script().events().to_vec();
        events.push(TimelineEvent::new("evt-6", 5000, Some(AgentId::Communication), Phase::Communication, "Follow-up"));
        let script = Script::load(events, vec![]).unwrap();

        assert_eq!(project(&script, Some(4)).phase, Phase::Communication);
        assert_eq!(project(&script, Some(5)).phase, Phase::Resolved);
    }

    #[test]
    fn test_agentless_event_completes_seen_agents() {
        let mut events = pipeline_script().events().to_vec();
        events.push(TimelineEvent::new("evt-6", 5000, None, Phase::Resolved, "Resolved"));
        let script = Script::load(events, vec![]).unwrap();
        let state = project(&script, Some(5));

        assert_eq!(state.phase, Phase::Resolved);
        assert!(state.agents.values().all(|s| *s == AgentStatus::Complete));
        assert_eq!(state.active_agent(), None);
    }

    #[test]
    fn test_visible_messages_inclusive() {
        let script = pipeline_script();

        let ids = |i| -> Vec<String> {
            project(&script, Some(i)).visible_messages.into_iter().map(|m| m.id).collect()
        };
        assert!(ids(0).is_empty());
        assert_eq!(ids(1), vec!["msg-1"]);
        assert_eq!(ids(2), vec!["msg-1", "msg-2"]);
        assert_eq!(ids(4), vec!["msg-1", "msg-2", "msg-3", "msg-4"]);
    }

    #[test]
    fn test_agent_stats_count_active_steps() {
        let events = vec![
            TimelineEvent::new("evt-1", 0, None, Phase::Alert, "Alarm").with_duration(500),
            TimelineEvent::new("evt-2", 1000, Some(AgentId::Triage), Phase::Triage, "Triage"),
            TimelineEvent::new("evt-3", 2000, Some(AgentId::Triage), Phase::Triage, "Classify").with_duration(4000),
            TimelineEvent::new("evt-4", 3000, Some(AgentId::Triage), Phase::Triage, "Route"),
            TimelineEvent::new("evt-5", 4000, Some(AgentId::Diagnosis), Phase::Diagnosis, "Diagnose"),
        ];
        let script = Script::load(events, vec![]).unwrap();

        let state = project(&script, Some(3));
        let triage = state.agent_stats[&AgentId::Triage];
        assert_eq!(triage.steps_active, 3);
        assert_eq!(triage.last_duration_ms, Some(4000));
        assert_eq!(state.agent_stats[&AgentId::Diagnosis], AgentStats::default());

        let state = project(&script, Some(4));
        assert_eq!(state.agent_stats[&AgentId::Diagnosis].steps_active, 1);
        assert_eq!(state.agent_stats[&AgentId::Diagnosis].last_duration_ms, None);

        // Stats of earlier positions are unaffected by later events
        assert_eq!(project(&script, Some(1)).agent_stats[&AgentId::Triage].last_duration_ms, None);
    }

    #[test]
    fn test_incident_metrics() {
        let events = vec![
            TimelineEvent::new("evt-1", 0, None, Phase::Alert, "Alarm"),
            TimelineEvent::new("evt-2", 1000, Some(AgentId::Diagnosis), Phase::Diagnosis, "Query").with_tool("cpu_anomaly"),
            TimelineEvent::new("evt-3", 2500, Some(AgentId::Remediation), Phase::Remediation, "Rollback").with_tool("rollback"),
        ];
        let messages = vec![
            A2AMessage::new("msg-1", 1000, Endpoint::External, Endpoint::Agent(AgentId::Diagnosis), MessageKind::Handoff, "alarm"),
            A2AMessage::new("msg-2", 2500, Endpoint::Agent(AgentId::Remediation), Endpoint::Agent(AgentId::Remediation), MessageKind::Action, "rollback"),
        ];
        let script = Script::load(events, messages).unwrap();

        assert_eq!(project(&script, None).metrics, IncidentMetrics::default());

        let metrics = project(&script, Some(1)).metrics;
        assert_eq!(metrics.messages, 1);
        assert_eq!(metrics.tool_calls, 1);
        assert_eq!(metrics.actions, 0);
        assert_eq!(metrics.elapsed_ms, 1000);

        let metrics = project(&script, Some(2)).metrics;
        assert_eq!(metrics.messages, 2);
        assert_eq!(metrics.tool_calls, 2);
        assert_eq!(metrics.actions, 1);
        assert_eq!(metrics.elapsed_ms, 2500);
    }

    #[test]
    fn test_projection_is_idempotent() {
        let script = pipeline_script();
        let first = project(&script, Some(2));
        let _ = project(&script, Some(4));
        assert_eq!(project(&script, Some(2)), first);
    }

    proptest! {
        #[test]
        fn prop_visible_messages_match_offsets_and_never_shrink(
            gaps in prop::collection::vec(0u64..5_000, 1..20),
            message_offsets in prop::collection::vec(0u64..60_000, 0..20),
        ) {
            let mut offset = 0;
            let events: Vec<TimelineEvent> = gaps
                .iter()
                .enumerate()
                .map(|(i, gap)| {
                    offset += gap;
                    let agent = AgentId::ALL[i % AgentId::ALL.len()];
                    TimelineEvent::new(format!("evt-{}", i), offset, Some(agent), Phase::Triage, "step")
                })
                .collect();
            let messages: Vec<A2AMessage> = message_offsets
                .iter()
                .enumerate()
                .map(|(i, at)| A2AMessage::new(format!("msg-{}", i), *at, Endpoint::External, Endpoint::Agent(AgentId::Triage), MessageKind::Report, "m"))
                .collect();
            let script = Script::load(events, messages).unwrap();

            let mut previous = 0;
            for i in 0..script.len() {
                let state = project(&script, Some(i));
                let at = script.event_at(i).unwrap().offset_ms;
                let expected: Vec<&A2AMessage> =
                    script.messages().iter().filter(|m| m.offset_ms <= at).collect();

                prop_assert_eq!(state.visible_messages.iter().collect::<Vec<_>>(), expected);
                prop_assert!(state.visible_messages.len() >= previous);
                prop_assert!(state.agents.values().filter(|s| **s == AgentStatus::Active).count() <= 1);
                previous = state.visible_messages.len();
            }
        }
    }
}
