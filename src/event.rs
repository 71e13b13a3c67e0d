use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Event kinds understood by the collector. `Display` yields the wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Ping,
    NormaliseTc,
    DeleteTc,
    EditTc,
    TestRun,
    GetApps,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => write!(f, "Ping"),
            Self::NormaliseTc => write!(f, "NormaliseTC"),
            Self::DeleteTc => write!(f, "DeleteTC"),
            Self::EditTc => write!(f, "EditTC"),
            Self::TestRun => write!(f, "TestRun"),
            Self::GetApps => write!(f, "GetApps"),
        }
    }
}

/// One scalar metadata payload. Untagged, so it encodes as a plain JSON
/// scalar on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for MetaValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for MetaValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Metadata attached to an event. Each emission builds zero or one map;
/// maps are never merged.
pub type Meta = BTreeMap<String, MetaValue>;

/// Wire representation of one telemetry event. Field names are fixed by the
/// collector protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "EventType")]
    pub event_type: String,

    /// Unix seconds at construction time.
    #[serde(rename = "CreatedAt")]
    pub created_at: i64,

    /// Empty exactly once, on the registration event.
    #[serde(rename = "InstallationID")]
    pub installation_id: String,

    #[serde(rename = "Meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl Event {
    pub fn new(kind: EventKind, meta: Option<Meta>) -> Self {
        Self {
            event_type: kind.to_string(),
            created_at: unix_now(),
            installation_id: String::new(),
            meta,
        }
    }
}

/// Collector response to the registration event.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationReply {
    #[serde(rename = "InstallationID")]
    pub installation_id: String,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
