//! Built-in demo scenario: payment-service CPU spike.
//!
//! A 115-second incident walked through by all four agents. Used when the
//! CLI is not given a `--script` file.

use replay_core::{
    A2AMessage, AgentId, Endpoint, MessageKind, Phase, Script, ScriptError, Severity,
    TimelineEvent,
};

const fn secs(s: u64) -> u64 {
    s * 1000
}

fn agent(a: AgentId) -> Endpoint {
    Endpoint::Agent(a)
}

/// Timeline events of the demo scenario.
pub fn demo_events() -> Vec<TimelineEvent> {
    use AgentId::*;

    vec![
        TimelineEvent::new("evt-1", secs(0), None, Phase::Alert, "Alert: CPU spike on payment-service")
            .with_detail("CPU above 95% on 3 hosts for more than 5 minutes")
            .with_severity(Severity::P1),
        TimelineEvent::new("evt-2", secs(8), Some(Triage), Phase::Triage, "Triage agent activated")
            .with_tool("search_recent_alerts"),
        TimelineEvent::new("evt-3", secs(15), Some(Triage), Phase::Triage, "Severity classified: P1")
            .with_detail("Revenue-critical service, error rate 12x baseline")
            .with_tool("error_rate_spike")
            .with_severity(Severity::P1),
        TimelineEvent::new("evt-4", secs(22), Some(Triage), Phase::Triage, "Routing to diagnosis")
            .with_duration(14_000),
        TimelineEvent::new("evt-5", secs(25), Some(Diagnosis), Phase::Diagnosis, "Diagnosis agent activated"),
        TimelineEvent::new("evt-6", secs(32), Some(Diagnosis), Phase::Diagnosis, "CPU anomaly on 3 hosts")
            .with_tool("cpu_anomaly"),
        TimelineEvent::new("evt-7", secs(40), Some(Diagnosis), Phase::Diagnosis, "Memory pressure confirmed")
            .with_tool("memory_pressure"),
        TimelineEvent::new("evt-8", secs(48), Some(Diagnosis), Phase::Diagnosis, "Deployment correlation found")
            .with_detail("v2.14.0 rolled out 47 minutes before the alert")
            .with_tool("deployment_events"),
        TimelineEvent::new("evt-9", secs(55), Some(Diagnosis), Phase::Diagnosis, "Root cause identified")
            .with_detail("Connection pool leak in v2.14.0 exhausts the heap")
            .with_duration(30_000),
        TimelineEvent::new("evt-10", secs(60), Some(Remediation), Phase::Remediation, "Remediation agent activated"),
        TimelineEvent::new("evt-11", secs(68), Some(Remediation), Phase::Remediation, "Rolling back to v2.13.2")
            .with_tool("rollback_deployment"),
        TimelineEvent::new("evt-12", secs(90), Some(Remediation), Phase::Remediation, "Rollback complete, metrics normalizing")
            .with_duration(30_000),
        TimelineEvent::new("evt-13", secs(95), Some(Communication), Phase::Communication, "Communication agent activated"),
        TimelineEvent::new("evt-14", secs(105), Some(Communication), Phase::Communication, "Incident report generated")
            .with_tool("search_incident_history"),
        TimelineEvent::new("evt-15", secs(115), None, Phase::Resolved, "Incident resolved")
            .with_detail("MTTR 1m 55s")
            .with_duration(115_000),
    ]
}

/// Agent-to-agent messages of the demo scenario.
pub fn demo_messages() -> Vec<A2AMessage> {
    use AgentId::*;

    vec![
        A2AMessage::new("msg-1", secs(8), Endpoint::External, agent(Triage), MessageKind::Handoff,
            "Alarm: payment-service CPU >95% on 3 hosts"),
        A2AMessage::new("msg-2", secs(22), agent(Triage), agent(Diagnosis), MessageKind::Handoff,
            "P1 payment-service: CPU spike, 1,247 errors"),
        A2AMessage::new("msg-3", secs(30), agent(Diagnosis), agent(Diagnosis), MessageKind::Query,
            "Running cpu_anomaly, memory_pressure, deployment_events"),
        A2AMessage::new("msg-4", secs(55), agent(Diagnosis), agent(Remediation), MessageKind::Handoff,
            "Root cause: pool leak in v2.14.0, recommend rollback"),
        A2AMessage::new("msg-5", secs(68), agent(Remediation), agent(Remediation), MessageKind::Action,
            "Executing rollback v2.14.0 -> v2.13.2"),
        A2AMessage::new("msg-6", secs(90), agent(Remediation), agent(Communication), MessageKind::Handoff,
            "Rollback complete, service healthy"),
        A2AMessage::new("msg-7", secs(105), agent(Communication), agent(Communication), MessageKind::Report,
            "Report and postmortem generated"),
    ]
}

/// The demo scenario as a loaded script.
pub fn payment_service_outage() -> Result<Script, ScriptError> {
    Script::load(demo_events(), demo_messages())
}
