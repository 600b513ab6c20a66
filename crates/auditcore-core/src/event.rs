// Event and batch types
//
// An Event is the unit of flow through the pipeline. Everything in the
// buffer has already passed sanitize + validate; the batch is formed by a
// contiguous drain of the buffer head and is immutable once dispatched.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::value::{FieldMap, FieldValue};

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            _ => Err(format!("unknown level: {}", s)),
        }
    }
}

/// One audit event.
///
/// `timestamp` is wall-clock capture time; `ingest_ms` is a monotonic
/// offset from pipeline start, immune to clock steps, used for latency
/// accounting.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(serialize_with = "rfc3339_millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub ingest_ms: u64,
    pub level: Level,
    pub message: String,
    pub fields: FieldMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    #[serde(skip)]
    pub schema_name: Option<String>,
}

fn rfc3339_millis<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

impl Event {
    pub fn new(level: Level, message: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            timestamp: Utc::now(),
            ingest_ms: 0,
            level,
            message: message.into(),
            fields,
            tenant_key: None,
            trace_id: None,
            span_id: None,
            parent_span_id: None,
            schema_name: None,
        }
    }

    /// Truncate the message to `max_len` bytes on a char boundary,
    /// recording the original length in `fields` when cut.
    pub fn bound_message(&mut self, max_len: usize) {
        if self.message.len() <= max_len {
            return;
        }
        let mut cut = max_len;
        while cut > 0 && !self.message.is_char_boundary(cut) {
            cut -= 1;
        }
        let original = self.message.len();
        self.message.truncate(cut);
        self.fields.insert(
            "message_truncated_from".to_string(),
            FieldValue::Number(original as f64),
        );
    }

    /// Approximate memory footprint, used for buffer byte accounting.
    pub fn approx_bytes(&self) -> usize {
        let fields: usize = self
            .fields
            .iter()
            .map(|(k, v)| 24 + k.len() + v.approx_bytes())
            .sum();
        96 + self.message.len() + fields
    }

    pub fn has_trace_context(&self) -> bool {
        self.trace_id.is_some()
    }
}

/// An ordered, immutable group of events handed to exactly one transport
/// invocation. On failure it is retried whole or diverted whole.
#[derive(Debug)]
pub struct Batch {
    id: Uuid,
    created_at: DateTime<Utc>,
    events: Vec<Event>,
}

impl Batch {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Give the events back, consuming the batch. Used when the whole
    /// batch is diverted to the fallback queue.
    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_level_round_trip() {
        for level in [Level::Debug, Level::Info, Level::Warn, Level::Error, Level::Fatal] {
            assert_eq!(level.as_str().parse::<Level>().unwrap(), level);
        }
        assert_eq!("WARNING".parse::<Level>().unwrap(), Level::Warn);
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn test_event_serialization_shape() {
        let mut event = Event::new(Level::Info, "login", fields! { "user" => "alice" });
        event.trace_id = Some("abc123".to_string());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["level"], "info");
        assert_eq!(json["message"], "login");
        assert_eq!(json["fields"]["user"], "alice");
        assert_eq!(json["trace_id"], "abc123");
        // Absent options and internal bookkeeping stay off the wire.
        assert!(json.get("span_id").is_none());
        assert!(json.get("ingest_ms").is_none());
        assert!(json.get("schema_name").is_none());
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_bound_message_truncates_and_records() {
        let mut event = Event::new(Level::Info, "x".repeat(100), FieldMap::new());
        event.bound_message(10);
        assert_eq!(event.message.len(), 10);
        assert_eq!(
            event.fields.get("message_truncated_from").unwrap().as_f64(),
            Some(100.0)
        );

        let mut short = Event::new(Level::Info, "short", FieldMap::new());
        short.bound_message(100);
        assert_eq!(short.message, "short");
        assert!(short.fields.is_empty());
    }

    #[test]
    fn test_bound_message_char_boundary() {
        let mut event = Event::new(Level::Info, "héllo wörld", FieldMap::new());
        event.bound_message(2);
        // "h" is 1 byte, "é" is 2; cutting at 2 lands mid-char and backs up.
        assert_eq!(event.message, "h");
    }

    #[test]
    fn test_batch_preserves_order() {
        let events: Vec<Event> = (0..5)
            .map(|i| Event::new(Level::Info, format!("m{}", i), FieldMap::new()))
            .collect();
        let batch = Batch::new(events);
        assert_eq!(batch.len(), 5);
        for (i, event) in batch.events().iter().enumerate() {
            assert_eq!(event.message, format!("m{}", i));
        }
    }

    #[test]
    fn test_batch_ids_distinct() {
        let a = Batch::new(Vec::new());
        let b = Batch::new(Vec::new());
        assert_ne!(a.id(), b.id());
        assert!(a.is_empty());
    }
}
