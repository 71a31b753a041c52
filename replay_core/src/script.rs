//! Script store - the immutable scenario a playback walks through.
//!
//! A [`Script`] is validated once at load time and never mutated after.
//! Event offsets are the authoritative timing source; messages are looked
//! up by offset when deriving what is visible at a position.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::model::{A2AMessage, TimelineEvent};

/// Errors raised while loading a script.
///
/// These are fatal: the caller has to supply a corrected script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// The script has no events
    #[error("Script has no events")]
    Empty,

    /// An event starts before the event preceding it
    #[error("Event {index} at {offset_ms}ms precedes previous event at {previous_ms}ms")]
    NonMonotonic {
        index: usize,
        offset_ms: u64,
        previous_ms: u64,
    },

    /// The script document could not be parsed
    #[error("Script parse error: {0}")]
    Parse(String),
}

/// Serialized shape of a script document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptDocument {
    pub events: Vec<TimelineEvent>,

    #[serde(default)]
    pub messages: Vec<A2AMessage>,
}

/// An ordered, validated incident script.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    events: Vec<TimelineEvent>,
    messages: Vec<A2AMessage>,
}

impl Script {
    /// Validates and loads a script.
    ///
    /// # Errors
    /// * `ScriptError::Empty` - no events
    /// * `ScriptError::NonMonotonic` - an event offset decreases
    pub fn load(events: Vec<TimelineEvent>, messages: Vec<A2AMessage>) -> Result<Self, ScriptError> {
        if events.is_empty() {
            return Err(ScriptError::Empty);
        }

        for (index, pair) in events.windows(2).enumerate() {
            if pair[1].offset_ms < pair[0].offset_ms {
                return Err(ScriptError::NonMonotonic {
                    index: index + 1,
                    offset_ms: pair[1].offset_ms,
                    previous_ms: pair[0].offset_ms,
                });
            }
        }

        Ok(Self { events, messages })
    }

    /// Parses a `{ "events": [...], "messages": [...] }` document and loads it.
    pub fn from_json(json: &str) -> Result<Self, ScriptError> {
        let doc: ScriptDocument =
            serde_json::from_str(json).map_err(|e| ScriptError::Parse(e.to_string()))?;
        Self::load(doc.events, doc.messages)
    }

    /// Returns the script in its serialized shape.
    pub fn to_document(&self) -> ScriptDocument {
        ScriptDocument {
            events: self.events.clone(),
            messages: self.messages.clone(),
        }
    }

    /// Returns the event at index `i`.
    pub fn event_at(&self, i: usize) -> Option<&TimelineEvent> {
        self.events.get(i)
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Always `false`; a loaded script has at least one event.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn messages(&self) -> &[A2AMessage] {
        &self.messages
    }

    /// Messages with `offset_ms <= offset_ms` (inclusive), in script order.
    pub fn messages_up_to(&self, offset_ms: u64) -> Vec<&A2AMessage> {
        self.messages
            .iter()
            .filter(|m| m.offset_ms <= offset_ms)
            .collect()
    }

    /// Script-time wait before event `i` fires, measured from event `i - 1`.
    ///
    /// Zero for the first event and for indices past the end.
    pub fn step_delay(&self, i: usize) -> Duration {
        match (i.checked_sub(1).and_then(|p| self.events.get(p)), self.events.get(i)) {
            (Some(prev), Some(next)) => {
                Duration::from_millis(next.offset_ms.saturating_sub(prev.offset_ms))
            }
            _ => Duration::ZERO,
        }
    }

    /// Offset of the last event.
    pub fn duration_ms(&self) -> u64 {
        self.events.last().map(|e| e.offset_ms).unwrap_or(0)
    }
}
