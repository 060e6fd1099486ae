use serde::Serialize;

/// Logical path recorded for handshake and request/response control traffic.
pub const PROTOCOL_PATH: &str = "/$protocol";

/// Logical path recorded for diagnostic (`sd`) server traffic.
pub const DEBUG_PATH: &str = "/$debug";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
        }
    }
}

/// A read or write observed on the wire, before it is stamped with a time and tag.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WireEvent {
    pub operation: Operation,
    pub path: String,
    pub size_bytes: u64,
}

/// A classified event ready to be buffered.
///
/// Built once by [`crate::Collector`]; fields are read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    operation: Operation,
    path: String,
    size_bytes: u64,
    timestamp_seconds: f64,
    tag: Option<String>,
}

impl Event {
    pub fn new(wire: WireEvent, timestamp_seconds: f64, tag: Option<String>) -> Self {
        debug_assert!(wire.path.starts_with('/'));
        Self {
            operation: wire.operation,
            path: wire.path,
            size_bytes: wire.size_bytes,
            timestamp_seconds,
            tag,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn timestamp_seconds(&self) -> f64 {
        self.timestamp_seconds
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn into_row(self) -> EventRow {
        EventRow {
            op: self.operation,
            path: self.path,
            bytes: self.size_bytes,
            time: self.timestamp_seconds,
            tag: self.tag,
        }
    }
}

/// One row as handed to an [`crate::EventSink`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRow {
    pub op: Operation,
    pub path: String,
    pub bytes: u64,
    pub time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_serializes_lowercase_op_and_omits_missing_tag() {
        let event = Event::new(
            WireEvent {
                operation: Operation::Write,
                path: "/users/1".to_string(),
                size_bytes: 42,
            },
            1_700_000_000.25,
            None,
        );

        let json = serde_json::to_value(event.into_row()).unwrap();
        assert_eq!(json["op"], "write");
        assert_eq!(json["path"], "/users/1");
        assert_eq!(json["bytes"], 42);
        assert_eq!(json["time"], 1_700_000_000.25);
        assert!(json.get("tag").is_none());
    }

    #[test]
    fn accessors_expose_the_stamped_event() {
        let event = Event::new(
            WireEvent {
                operation: Operation::Read,
                path: PROTOCOL_PATH.to_string(),
                size_bytes: 23,
            },
            12.5,
            Some("edge".to_string()),
        );

        assert_eq!(event.operation(), Operation::Read);
        assert_eq!(event.path(), "/$protocol");
        assert_eq!(event.size_bytes(), 23);
        assert_eq!(event.timestamp_seconds(), 12.5);
        assert_eq!(event.tag(), Some("edge"));
    }
}
