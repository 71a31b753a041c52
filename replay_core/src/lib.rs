//! Incident Replay Core - deterministic playback of scripted incident timelines
//!
//! This library walks a static, multi-agent incident script at wall-clock
//! pace and derives UI state at every position:
//! 1. **Script**: validated, immutable events and agent-to-agent messages
//! 2. **Scheduler**: Idle/Running/Paused/Complete state machine with one timer
//! 3. **Projector**: pure `(script, index) -> DerivedState`
//! 4. **Controller**: commands plus synchronous snapshot subscriptions
//!
//! Time enters only through `replay_env::Clock`.

pub mod model;
pub mod script;
pub mod speed;
pub mod projector;
pub mod scheduler;
pub mod controller;

// Re-export key types for convenience
pub use model::{A2AMessage, AgentId, AgentStatus, Endpoint, MessageKind, Phase, Severity, TimelineEvent};
pub use script::{Script, ScriptDocument, ScriptError};
pub use speed::{Speed, SpeedError};
pub use projector::{project, AgentStats, DerivedState, IncidentMetrics};
pub use scheduler::{Pacing, PlaybackConfig, PlaybackState, RunMode, Scheduler, Transition};
pub use controller::{Command, Listener, PlaybackController, Snapshot, SubscriptionId};
