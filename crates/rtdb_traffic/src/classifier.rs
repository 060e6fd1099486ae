//! Grammar for realtime-database client debug lines.
//!
//! Protocol lines look like `p:<counter>: <prefix>{...}`. A non-empty prefix marks traffic
//! received from the server (`from server: ` or `handleServerMessage <code> `); an empty
//! prefix marks an outgoing request whose payload is `{"r":<n>,"a":"<action>","b":{...}}`.
//! Lines reporting `serverTimeOffset <ms>` update the collector's clock offset.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::WireSizeModel;
use crate::event::{Operation, WireEvent, DEBUG_PATH, PROTOCOL_PATH};

/// Outcome of classifying one raw line.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Classification {
    /// The stream reported a new server time offset, in milliseconds.
    OffsetUpdate(i64),
    Event(WireEvent),
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum IgnoreReason {
    /// Not a protocol line at all.
    Unmatched,
    /// A read prefix known to duplicate another log line.
    RedundantPrefix,
    /// An outgoing payload that does not look like a request.
    MalformedRequest,
    /// The message kind requires a path and none was present.
    MissingPath { code: String },
    UnknownCode { code: String },
    /// The offset value does not fit a signed 64-bit integer.
    OffsetOutOfRange,
}

impl IgnoreReason {
    /// Whether this line deserved a diagnostic (as opposed to being dropped silently).
    pub fn is_diagnostic(&self) -> bool {
        !matches!(self, IgnoreReason::Unmatched | IgnoreReason::RedundantPrefix)
    }
}

/// How a message kind maps to a logical path.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum PathRule {
    /// Path taken from the payload's leading `"p"` field.
    FromPayload,
    Fixed(&'static str),
}

/// Server message types, keyed by the code after `handleServerMessage`. The untyped
/// `from server:` origin uses the empty code.
const READ_DIALECTS: &[(&str, PathRule)] = &[
    ("d", PathRule::FromPayload),
    ("m", PathRule::FromPayload),
    ("", PathRule::Fixed(PROTOCOL_PATH)),
    ("sd", PathRule::Fixed(DEBUG_PATH)),
];

/// Request actions, keyed by the `"a"` field.
const WRITE_DIALECTS: &[(&str, PathRule)] = &[
    ("m", PathRule::FromPayload),
    ("p", PathRule::FromPayload),
    ("q", PathRule::Fixed(PROTOCOL_PATH)),
    ("l", PathRule::Fixed(PROTOCOL_PATH)),
    ("n", PathRule::Fixed(PROTOCOL_PATH)),
    ("auth", PathRule::Fixed(PROTOCOL_PATH)),
    ("s", PathRule::Fixed(PROTOCOL_PATH)),
];

fn lookup(table: &[(&str, PathRule)], code: &str) -> Option<PathRule> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, rule)| *rule)
}

struct Patterns {
    log_record: Regex,
    server_time_offset: Regex,
    read_prefix: Regex,
    read_path: Regex,
    write_request: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        log_record: Regex::new(r"^p:\d+: (.*?)(\{.*\})\s*$").unwrap(),
        server_time_offset: Regex::new(r"\bserverTimeOffset\b[^-\d]*(-?\d+)\s*$").unwrap(),
        read_prefix: Regex::new(r"^(?:from server:|handleServerMessage (\w+))\s*$").unwrap(),
        read_path: Regex::new(r#"^\{"p":"([^"]*)""#).unwrap(),
        write_request: Regex::new(r#"^\{"r":\d+,"a":"(\w+)","b":\{(?:"p":"([^"]*)")?"#)
            .unwrap(),
    })
}

/// Maps raw debug lines to [`Classification`]s.
///
/// Never fails: anything it cannot make sense of comes back as [`Classification::Ignored`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LineClassifier {
    wire_size: WireSizeModel,
}

impl LineClassifier {
    pub fn new(wire_size: WireSizeModel) -> Self {
        Self { wire_size }
    }

    pub fn classify(&self, line: &str) -> Classification {
        let patterns = patterns();

        let Some(record) = patterns.log_record.captures(line) else {
            return match patterns.server_time_offset.captures(line) {
                Some(caps) => parse_offset(&caps[1]),
                None => Classification::Ignored(IgnoreReason::Unmatched),
            };
        };

        let prefix = record.get(1).map_or("", |m| m.as_str()).trim();
        let payload = record.get(2).map_or("", |m| m.as_str());

        if prefix.is_empty() {
            self.classify_write(payload)
        } else {
            self.classify_read(prefix, payload)
        }
    }

    fn classify_read(&self, prefix: &str, payload: &str) -> Classification {
        let patterns = patterns();
        let Some(origin) = patterns.read_prefix.captures(prefix) else {
            return Classification::Ignored(IgnoreReason::RedundantPrefix);
        };
        let message_type = origin.get(1).map_or("", |m| m.as_str());

        let mut size_bytes = payload.len() as u64 + self.wire_size.message_overhead;
        if !message_type.is_empty() {
            size_bytes += self.wire_size.type_tag_overhead + message_type.len() as u64;
        }

        let path = match lookup(READ_DIALECTS, message_type) {
            Some(PathRule::Fixed(path)) => path.to_string(),
            Some(PathRule::FromPayload) => {
                let Some(caps) = patterns.read_path.captures(payload) else {
                    warn!(code = message_type, payload, "unparsed server message: no path");
                    return missing_path(message_type);
                };
                format!("/{}", &caps[1])
            }
            None => {
                warn!(code = message_type, payload, "unknown server message type");
                return unknown_code(message_type);
            }
        };

        Classification::Event(WireEvent {
            operation: Operation::Read,
            path,
            size_bytes,
        })
    }

    fn classify_write(&self, payload: &str) -> Classification {
        let Some(caps) = patterns().write_request.captures(payload) else {
            warn!(payload, "unparsed client request");
            return Classification::Ignored(IgnoreReason::MalformedRequest);
        };
        let action = &caps[1];
        let size_bytes = payload.len() as u64 + self.wire_size.message_overhead;

        let path = match lookup(WRITE_DIALECTS, action) {
            Some(PathRule::Fixed(path)) => path.to_string(),
            Some(PathRule::FromPayload) => match caps.get(2) {
                Some(path) => path.as_str().to_string(),
                None => {
                    warn!(code = action, payload, "unparsed client request: no path");
                    return missing_path(action);
                }
            },
            None => {
                warn!(code = action, payload, "unknown client request action");
                return unknown_code(action);
            }
        };

        if !path.starts_with('/') {
            warn!(code = action, path = %path, "client request path is not absolute");
            return missing_path(action);
        }

        Classification::Event(WireEvent {
            operation: Operation::Write,
            path,
            size_bytes,
        })
    }
}

fn parse_offset(raw: &str) -> Classification {
    match raw.parse::<i64>() {
        Ok(millis) => {
            debug!(millis, "server time offset reported");
            Classification::OffsetUpdate(millis)
        }
        Err(err) => {
            warn!(raw, %err, "server time offset out of range");
            Classification::Ignored(IgnoreReason::OffsetOutOfRange)
        }
    }
}

fn missing_path(code: &str) -> Classification {
    Classification::Ignored(IgnoreReason::MissingPath {
        code: code.to_string(),
    })
}

fn unknown_code(code: &str) -> Classification {
    Classification::Ignored(IgnoreReason::UnknownCode {
        code: code.to_string(),
    })
}
