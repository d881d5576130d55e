//! Build export event envelopes.
//!
//! The export API wraps every build event in an envelope of the form
//! `{"type": {"eventType": "..."}, "data": {...}}`. Decoding happens in two
//! steps: the envelope selects the event type, then the `data` object is
//! decoded into the payload type for that event. Unknown event types and
//! unknown fields are ignored.

use serde::Deserialize;
use serde_json::Value;

/// SSE event name carrying build events.
pub const BUILD_EVENT: &str = "BuildEvent";

/// Event types requested from the export API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    ProjectStructure,
    BuildRequestedTasks,
    UserNamedValue,
    BuildFinished,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::ProjectStructure,
        EventType::BuildRequestedTasks,
        EventType::UserNamedValue,
        EventType::BuildFinished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ProjectStructure => "ProjectStructure",
            EventType::BuildRequestedTasks => "BuildRequestedTasks",
            EventType::UserNamedValue => "UserNamedValue",
            EventType::BuildFinished => "BuildFinished",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Comma-separated list for the `eventTypes` query parameter.
    pub fn query_value() -> String {
        Self::ALL
            .iter()
            .map(EventType::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: RawEventKind,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEventKind {
    event_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStructure {
    pub root_project_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildRequestedTasks {
    /// Task names in the order they were requested.
    #[serde(default)]
    pub requested: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserNamedValue {
    pub key: String,
    /// Custom values may be recorded without a value.
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuildFinished {
    /// `null` and absent both mean the build succeeded.
    #[serde(default)]
    pub failure: Option<Value>,
}

impl BuildFinished {
    pub fn successful(&self) -> bool {
        self.failure.is_none()
    }
}

/// A decoded build event.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    ProjectStructure(ProjectStructure),
    BuildRequestedTasks(BuildRequestedTasks),
    UserNamedValue(UserNamedValue),
    BuildFinished(BuildFinished),
    /// Any event type this client does not consume.
    Other(String),
}

impl BuildEvent {
    /// Decode one `BuildEvent` SSE payload.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        let envelope: RawEnvelope = serde_json::from_str(payload)?;
        let event = match EventType::parse(&envelope.kind.event_type) {
            Some(EventType::ProjectStructure) => {
                BuildEvent::ProjectStructure(serde_json::from_value(envelope.data)?)
            }
            Some(EventType::BuildRequestedTasks) => {
                BuildEvent::BuildRequestedTasks(serde_json::from_value(envelope.data)?)
            }
            Some(EventType::UserNamedValue) => {
                BuildEvent::UserNamedValue(serde_json::from_value(envelope.data)?)
            }
            Some(EventType::BuildFinished) => {
                BuildEvent::BuildFinished(serde_json::from_value(envelope.data)?)
            }
            None => BuildEvent::Other(envelope.kind.event_type),
        };
        Ok(event)
    }

    /// Event type name as it appeared on the wire.
    pub fn type_name(&self) -> &str {
        match self {
            BuildEvent::ProjectStructure(_) => EventType::ProjectStructure.as_str(),
            BuildEvent::BuildRequestedTasks(_) => EventType::BuildRequestedTasks.as_str(),
            BuildEvent::UserNamedValue(_) => EventType::UserNamedValue.as_str(),
            BuildEvent::BuildFinished(_) => EventType::BuildFinished.as_str(),
            BuildEvent::Other(name) => name,
        }
    }
}
