//! Raw sensor events as recorded by the home installation.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single sensor reading.
///
/// Only `timestamp` and `room` are interpreted; everything else the producer
/// sends (`nodeId`, `onOff`, `attribute`, ...) is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Epoch seconds
    pub timestamp: i64,
    /// Room or device the event came from
    #[serde(default)]
    pub room: String,
    /// Remaining producer fields
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl RawEvent {
    pub fn new(timestamp: i64, room: impl Into<String>) -> Self {
        Self {
            timestamp,
            room: room.into(),
            attributes: Map::new(),
        }
    }

    /// Attach a producer attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Event time as a UTC datetime, if the timestamp is representable.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.timestamp, 0).single()
    }

    /// Whether the producer reported the device as switched on.
    pub fn is_on(&self) -> Option<bool> {
        self.attributes.get("onOff").and_then(Value::as_bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_event_keeps_extra_fields() {
        let line = r#"{"timestamp": 1737900000, "room": "pillbox", "nodeId": 1, "onOff": true}"#;
        let event: RawEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.timestamp, 1737900000);
        assert_eq!(event.room, "pillbox");
        assert_eq!(event.is_on(), Some(true));

        let back = serde_json::to_value(&event).unwrap();
        assert_eq!(back["nodeId"], 1);
    }

    #[test]
    fn test_missing_timestamp_is_rejected() {
        let result = serde_json::from_str::<RawEvent>(r#"{"room": "kitchen"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_with_attribute_round_trips() {
        let event = RawEvent::new(60, "pillbox").with_attribute("onOff", Value::Bool(false));
        assert_eq!(event.is_on(), Some(false));

        let line = serde_json::to_string(&event).unwrap();
        let parsed: RawEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(RawEvent::new(60, "pillbox").is_on(), None);
    }

    #[test]
    fn test_time_conversion() {
        let event = RawEvent::new(0, "hall");
        assert_eq!(event.time().unwrap().timestamp(), 0);
    }
}
