//! Telemetry event payloads
//!
//! The core only constructs the event payloads; emission is a line-oriented
//! JSON sink on stderr so consumers can ingest events without parsing the
//! human-facing output. The release poller uses this for its heartbeat.

use serde::{Deserialize, Serialize};

/// Tool identifier stamped into events and run reports
pub const TOOL_NAME: &str = "pypi-batch-publisher";

/// A single telemetry event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub source: String,
    pub phase: String,
    pub status: String,
    pub tool: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Build a telemetry event for the fixed tool identifier
pub fn make_event(
    source: &str,
    phase: &str,
    status: &str,
    attempt: Option<u64>,
    details: Option<serde_json::Value>,
) -> TelemetryEvent {
    TelemetryEvent {
        source: source.to_string(),
        phase: phase.to_string(),
        status: status.to_string(),
        tool: TOOL_NAME.to_string(),
        attempt,
        duration_ms: None,
        details,
    }
}

/// Emit an event as one JSON line on stderr
pub fn emit_event(event: &TelemetryEvent) {
    if let Ok(line) = serde_json::to_string(event) {
        eprintln!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_event_stamps_tool() {
        let event = make_event("pypi", "wait_release", "retried", Some(3), None);

        assert_eq!(event.tool, TOOL_NAME);
        assert_eq!(event.attempt, Some(3));
        assert_eq!(event.phase, "wait_release");
    }

    #[test]
    fn test_event_serialization_skips_empty_fields() {
        let event = make_event("pypi", "wait_release", "retried", None, None);
        let json = serde_json::to_string(&event).unwrap();

        assert!(!json.contains("attempt"));
        assert!(!json.contains("duration_ms"));
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_event_serialization_with_details() {
        let event = make_event(
            "pypi",
            "wait_release",
            "retried",
            Some(1),
            Some(serde_json::json!({"package": "demo_pkg", "seconds_remaining": 12.5})),
        );
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("\"package\":\"demo_pkg\""));
        assert!(json.contains("\"attempt\":1"));
    }
}
