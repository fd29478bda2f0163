//! Call metadata: the per-command record handed to instrumentation, and the
//! wait-operation sub-protocol types.

use std::sync::OnceLock;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SerializedError;
use crate::guid::Guid;

/// Caller-side source location attached to a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

/// Metadata sent alongside each command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// Public API label for this call, used for tracing and reports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
    /// Internal calls are hidden from user-facing traces.
    #[serde(default)]
    pub internal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

/// Phase of a wait operation spanning multiple wire round trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitPhase {
    Before,
    Log,
    After,
}

/// Wait-operation routing info, carried in `params.info` of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitInfo {
    pub wait_id: String,
    pub phase: WaitPhase,
    /// Log line for the `log` phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure message for the `after` phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WaitInfo {
    /// Extract wait info from command params, if present.
    pub fn from_params(params: &Value) -> Option<Self> {
        let info = params.get("info")?;
        if info.get("waitId").is_none() {
            return None;
        }
        serde_json::from_value(info.clone()).ok()
    }
}

/// Everything the server knows about one logical call: identity, timing,
/// progress log, and outcome. Instrumentation hooks receive snapshots of
/// this record.
#[derive(Debug, Clone)]
pub struct CallMetadata {
    /// Correlation id derived from the wire command id, e.g. `call@7`.
    pub id: String,
    pub location: Option<SourceLocation>,
    pub api_name: Option<String>,
    pub internal: bool,
    pub step_id: Option<String>,
    /// Guid of the target node's domain object.
    pub object_guid: Guid,
    /// Object kind tag, e.g. `"Page"`.
    pub kind: String,
    pub method: String,
    pub params: Value,
    /// Monotonic milliseconds when the call started.
    pub start_time: f64,
    /// Monotonic milliseconds when the call ended; 0 while in flight.
    pub end_time: f64,
    /// Ordered human-readable progress lines.
    pub log: Vec<String>,
    pub error: Option<SerializedError>,
    /// Whether this call may legitimately race the closure of its own scope
    /// (e.g. `close` itself, or a navigation whose target may close).
    pub potentially_closes_scope: bool,
}

impl CallMetadata {
    /// Start a new call record with the clock already running.
    pub fn new(command_id: u64, wire: &WireMetadata, object_guid: Guid, kind: &str, method: &str, params: Value) -> Self {
        Self {
            id: format!("call@{command_id}"),
            location: wire.location.clone(),
            api_name: wire.api_name.clone(),
            internal: wire.internal,
            step_id: wire.step_id.clone(),
            object_guid,
            kind: kind.to_string(),
            method: method.to_string(),
            params,
            start_time: monotonic_time_ms(),
            end_time: 0.0,
            log: Vec::new(),
            error: None,
            potentially_closes_scope: false,
        }
    }
}

/// Milliseconds since an arbitrary process-local epoch. Monotonic, so call
/// durations are meaningful even if the wall clock steps.
pub fn monotonic_time_ms() -> f64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = *EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_secs_f64() * 1000.0
}

/// Collapse consecutive duplicate log lines, keeping first occurrences.
/// Polling operations tend to log the same line many times in a row; the
/// compressed form is what gets attached to error responses.
pub fn compress_call_log(log: &[String]) -> Vec<String> {
    let mut compressed: Vec<String> = Vec::with_capacity(log.len());
    for line in log {
        if compressed.last().map(|last| last == line) != Some(true) {
            compressed.push(line.clone());
        }
    }
    compressed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_metadata_camel_case() {
        let metadata: WireMetadata = serde_json::from_value(json!({
            "apiName": "page.goto",
            "internal": false,
            "stepId": "step-1",
            "location": { "file": "test.spec.ts", "line": 10 },
        }))
        .unwrap();
        assert_eq!(metadata.api_name.as_deref(), Some("page.goto"));
        assert_eq!(metadata.step_id.as_deref(), Some("step-1"));
        assert_eq!(metadata.location.as_ref().unwrap().line, Some(10));
    }

    #[test]
    fn wait_info_parsed_from_params() {
        let params = json!({
            "timeout": 5000,
            "info": { "waitId": "wait-7", "phase": "log", "message": "still waiting" },
        });
        let info = WaitInfo::from_params(&params).unwrap();
        assert_eq!(info.wait_id, "wait-7");
        assert_eq!(info.phase, WaitPhase::Log);
        assert_eq!(info.message.as_deref(), Some("still waiting"));
    }

    #[test]
    fn wait_info_absent_for_plain_params() {
        assert!(WaitInfo::from_params(&json!({ "url": "about:blank" })).is_none());
        assert!(WaitInfo::from_params(&json!({ "info": { "phase": "before" } })).is_none());
    }

    #[test]
    fn monotonic_time_advances() {
        let a = monotonic_time_ms();
        let b = monotonic_time_ms();
        assert!(b >= a);
    }

    #[test]
    fn compress_collapses_consecutive_duplicates() {
        let log = vec![
            "waiting".to_string(),
            "waiting".to_string(),
            "waiting".to_string(),
            "found".to_string(),
            "waiting".to_string(),
        ];
        assert_eq!(compress_call_log(&log), vec!["waiting", "found", "waiting"]);
    }

    #[test]
    fn compress_empty_log() {
        assert!(compress_call_log(&[]).is_empty());
    }
}
