//! Data model for incident scripts.
//!
//! Everything here is plain data: agents and their pipeline rank, the
//! incident phases, and the two record types a script is made of.

use serde::{Deserialize, Serialize};

/// A responder agent in the incident pipeline.
///
/// Declaration order is pipeline order, so the derived `Ord` agrees with
/// [`AgentId::rank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    Triage,
    Diagnosis,
    Remediation,
    Communication,
}

impl AgentId {
    /// All agents in pipeline order.
    pub const ALL: [AgentId; 4] = [
        AgentId::Triage,
        AgentId::Diagnosis,
        AgentId::Remediation,
        AgentId::Communication,
    ];

    /// The last agent in the pipeline.
    pub const TERMINAL: AgentId = AgentId::Communication;

    /// Position in the pipeline, starting at 0 for triage.
    pub fn rank(&self) -> u8 {
        match self {
            AgentId::Triage => 0,
            AgentId::Diagnosis => 1,
            AgentId::Remediation => 2,
            AgentId::Communication => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentId::Triage => "triage",
            AgentId::Diagnosis => "diagnosis",
            AgentId::Remediation => "remediation",
            AgentId::Communication => "communication",
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for AgentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "triage" => Ok(AgentId::Triage),
            "diagnosis" => Ok(AgentId::Diagnosis),
            "remediation" => Ok(AgentId::Remediation),
            "communication" => Ok(AgentId::Communication),
            _ => Err(format!("Unknown agent: {}", s)),
        }
    }
}

/// Incident lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Alert,
    Triage,
    Diagnosis,
    Remediation,
    Communication,
    Resolved,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Alert => "alert",
            Phase::Triage => "triage",
            Phase::Diagnosis => "diagnosis",
            Phase::Remediation => "remediation",
            Phase::Communication => "communication",
            Phase::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-agent status in the derived state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Active,
    Complete,
}

/// Incident severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    P1,
    P2,
    P3,
    P4,
}

/// Kind of an agent-to-agent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Handoff,
    Query,
    Result,
    Action,
    Report,
}

/// Sender or receiver of a message.
///
/// Serialized as the agent name, or `"external"` for the outside world
/// (monitoring alarms and the like). `"alert"` is accepted as an alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Endpoint {
    Agent(AgentId),
    External,
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl TryFrom<String> for Endpoint {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "external" | "alert" => Ok(Endpoint::External),
            other => other.parse().map(Endpoint::Agent),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Agent(agent) => write!(f, "{}", agent),
            Endpoint::External => write!(f, "external"),
        }
    }
}

/// One step of the incident timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Unique event id (e.g., "evt-3")
    pub id: String,

    /// Milliseconds from scenario start
    pub offset_ms: u64,

    /// Responsible agent, `None` for scenario-level events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentId>,

    /// Phase tag
    pub phase: Phase,

    pub title: String,

    #[serde(default)]
    pub detail: String,

    /// Tool the agent invoked, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    /// Explicit duration of the step's work, reported in agent stats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl TimelineEvent {
    /// Creates an event with only the required fields set.
    pub fn new(
        id: impl Into<String>,
        offset_ms: u64,
        agent: Option<AgentId>,
        phase: Phase,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            offset_ms,
            agent,
            phase,
            title: title.into(),
            detail: String::new(),
            tool: None,
            severity: None,
            duration_ms: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// A message passed between agents (A2A).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct A2AMessage {
    pub id: String,

    /// Milliseconds from scenario start
    pub offset_ms: u64,

    pub from: Endpoint,
    pub to: Endpoint,

    pub content: String,

    pub kind: MessageKind,
}

impl A2AMessage {
    pub fn new(
        id: impl Into<String>,
        offset_ms: u64,
        from: Endpoint,
        to: Endpoint,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            offset_ms,
            from,
            to,
            content: content.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_follows_pipeline_order() {
        let ranks: Vec<u8> = AgentId::ALL.iter().map(|a| a.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
        assert!(AgentId::Triage < AgentId::Communication);
        assert_eq!(AgentId::TERMINAL.rank(), 3);
    }

    #[test]
    fn test_endpoint_serde() {
        let json = serde_json::to_string(&Endpoint::Agent(AgentId::Diagnosis)).unwrap();
        assert_eq!(json, "\"diagnosis\"");

        let external: Endpoint = serde_json::from_str("\"alert\"").unwrap();
        assert_eq!(external, Endpoint::External);
        assert_eq!(serde_json::to_string(&external).unwrap(), "\"external\"");

        assert!(serde_json::from_str::<Endpoint>("\"pager\"").is_err());
    }

    #[test]
    fn test_event_optional_fields_skipped() {
        let event = TimelineEvent::new("evt-1", 0, None, Phase::Alert, "Alert fired");
        let json = serde_json::to_value(&event).unwrap();

        assert!(json.get("agent").is_none());
        assert!(json.get("tool").is_none());
        assert_eq!(json["phase"], "alert");
    }
}
