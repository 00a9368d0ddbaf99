//! Event types shared by the transform stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A structured record: field name to JSON value, insertion ordered
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Event time as integer seconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTime(i64);

impl EventTime {
    /// Create an event time from epoch seconds
    pub fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    /// Epoch seconds
    pub fn as_secs(&self) -> i64 {
        self.0
    }

    /// Calendar representation in UTC
    ///
    /// Returns `None` when the value is outside chrono's representable range.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.0, 0)
    }
}

impl From<i64> for EventTime {
    fn from(secs: i64) -> Self {
        Self(secs)
    }
}

impl std::fmt::Display for EventTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tagged, timestamped record flowing through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Routing tag
    pub tag: String,
    /// Event time
    pub time: EventTime,
    /// Record body
    pub record: Record,
}

impl Event {
    /// Create a new event
    pub fn new(tag: impl Into<String>, time: impl Into<EventTime>, record: Record) -> Self {
        Self {
            tag: tag.into(),
            time: time.into(),
            record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_event_time_to_datetime() {
        let time = EventTime::from_secs(1_388_534_400);
        let dt = time.to_datetime().unwrap();
        assert_eq!(dt.year(), 2014);
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.day(), 1);
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn test_event_serializes_time_as_number() {
        let event = Event::new("a.b", 42, Record::new());
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"tag":"a.b","time":42,"record":{}}"#);
    }
}
