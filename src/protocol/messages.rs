//! Envelope and message types carried between stages
//!
//! The envelope is the unit of work: one ticket's payload plus its route
//! plan. Its wire shape is
//!
//! ```json
//! { "payload": { "...": "..." }, "route": { "actors": ["..."], "current": 0 } }
//! ```

use crate::error::{MeshError, MeshResult, RouteError};
use crate::protocol::stages::StageId;
use crate::routing::plan::{RoutePlan, WireRoute};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Ticket fields accumulated along the route
///
/// Fields are appended or overwritten by stages, never deleted; there is
/// no removal API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value; only objects are valid payloads
    pub fn from_value(value: Value) -> MeshResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(MeshError::invalid_input(format!(
                "payload must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Set or overwrite a field
    pub fn set<V: Into<Value>>(&mut self, key: &str, value: V) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Builder-style `set`
    pub fn with<V: Into<Value>>(mut self, key: &str, value: V) -> Self {
        self.set(key, value);
        self
    }

    /// Append to a list field, creating it when absent
    ///
    /// A scalar already stored under `key` becomes the first list element so
    /// no earlier entry is lost.
    pub fn append_to<V: Into<Value>>(&mut self, key: &str, value: V) {
        let entry = self
            .0
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match entry {
            Value::Array(items) => items.push(value.into()),
            Value::Null => *entry = Value::Array(vec![value.into()]),
            other => {
                let previous = other.take();
                *other = Value::Array(vec![previous, value.into()]);
            }
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One ticket's payload plus its route plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub payload: Payload,
    pub route: RoutePlan,
}

#[derive(Deserialize)]
struct WireEnvelope {
    #[serde(default)]
    payload: Value,
    route: WireRoute,
}

impl Envelope {
    pub fn new(payload: Payload, route: RoutePlan) -> Self {
        Self { payload, route }
    }

    /// Build a fresh envelope for an incoming ticket
    ///
    /// Assigns a `ticket_id` when the payload has none and places the cursor
    /// on the first stage of `initial_route`.
    pub fn for_ticket(mut payload: Payload, initial_route: &[StageId]) -> Result<Self, RouteError> {
        let route = RoutePlan::starting_at(initial_route.to_vec())?;
        if payload.get_str("ticket_id").is_none() {
            payload.set("ticket_id", Uuid::new_v4().to_string());
        }
        Ok(Self { payload, route })
    }

    /// Ticket identifier, or "unknown" when the payload carries none
    pub fn ticket_id(&self) -> String {
        match self.payload.get("ticket_id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => "unknown".to_string(),
        }
    }

    /// Parse the wire form, reporting route problems as `RouteError`
    pub fn from_json(json: &str) -> MeshResult<Self> {
        let wire: WireEnvelope = serde_json::from_str(json)?;
        let payload = Payload::from_value(wire.payload)?;
        let route = RoutePlan::try_from(wire.route)?;
        Ok(Self { payload, route })
    }

    pub fn to_json(&self) -> MeshResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Audit record appended to a payload's `recovery_log`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: StageId,
    pub timestamp: DateTime<Utc>,
    pub reasons: Vec<String>,
}

impl From<AuditEntry> for Value {
    fn from(entry: AuditEntry) -> Self {
        serde_json::json!({
            "actor": entry.actor.as_str(),
            "timestamp": entry.timestamp.to_rfc3339(),
            "reasons": entry.reasons,
        })
    }
}

/// Terminal status of a ticket traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Resolved,
    NeedsReview,
    Escalated,
    Failed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Resolved => "resolved",
            TicketStatus::NeedsReview => "needs_review",
            TicketStatus::Escalated => "escalated",
            TicketStatus::Failed => "failed",
        }
    }
}

/// Error report attached to a ticket that could not complete its route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error: ErrorDetails,
    pub ticket_id: String,
}

/// Error details structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    /// Human-readable description (sanitized)
    pub message: String,
}

/// Error codes reported for failed tickets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRoute,
    ContractViolation,
    StageUnavailable,
    StageFailed,
    HopLimitExceeded,
    InvalidInput,
    InternalError,
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = Envelope::new(
            Payload::new().with("ticket_id", "T-100"),
            RoutePlan::new(
                vec![StageId::IntentClassifier, StageId::DecisionRouter],
                1,
            )
            .unwrap(),
        );

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "payload": {"ticket_id": "T-100"},
                "route": {"actors": ["intent-classifier", "decision-router"], "current": 1}
            })
        );
    }

    #[test]
    fn test_envelope_from_json() {
        let envelope = Envelope::from_json(
            r#"{"payload": {"ticket_id": "T-7"}, "route": {"actors": ["classify", "decision-router"], "current": 0}}"#,
        )
        .unwrap();

        assert_eq!(envelope.ticket_id(), "T-7");
        assert_eq!(envelope.route.current(), StageId::IntentClassifier);
    }

    #[test]
    fn test_envelope_from_json_reports_route_errors() {
        let err = Envelope::from_json(r#"{"payload": {}, "route": {"actors": [], "current": 0}}"#)
            .unwrap_err();
        assert!(matches!(err, MeshError::Route(RouteError::InvalidRoute { .. })));

        let err = Envelope::from_json(
            r#"{"payload": {}, "route": {"actors": ["classify"], "current": 3}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MeshError::Route(_)));
    }

    #[test]
    fn test_envelope_from_json_rejects_non_object_payload() {
        let err = Envelope::from_json(
            r#"{"payload": [1, 2], "route": {"actors": ["classify"], "current": 0}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MeshError::InvalidInput { .. }));
    }

    #[test]
    fn test_for_ticket_assigns_id() {
        let envelope = Envelope::for_ticket(
            Payload::new().with("message", "hello"),
            &[StageId::TicketIngester, StageId::ResponseAggregator],
        )
        .unwrap();

        assert_ne!(envelope.ticket_id(), "unknown");
        assert_eq!(envelope.route.cursor(), 0);

        let kept = Envelope::for_ticket(
            Payload::new().with("ticket_id", "T-1"),
            &[StageId::TicketIngester],
        )
        .unwrap();
        assert_eq!(kept.ticket_id(), "T-1");
    }

    #[test]
    fn test_for_ticket_rejects_empty_route() {
        assert!(Envelope::for_ticket(Payload::new(), &[]).is_err());
    }

    #[test]
    fn test_payload_append_to() {
        let mut payload = Payload::new();
        payload.append_to("recovery_log", json!({"n": 1}));
        payload.append_to("recovery_log", json!({"n": 2}));
        assert_eq!(payload.get("recovery_log"), Some(&json!([{"n": 1}, {"n": 2}])));

        payload.set("note", "first");
        payload.append_to("note", "second");
        assert_eq!(payload.get("note"), Some(&json!(["first", "second"])));
    }

    #[test]
    fn test_audit_entry_serialization() {
        let entry = AuditEntry {
            actor: StageId::EscalationRouter,
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            reasons: vec!["manual_review".to_string()],
        };
        let value = Value::from(entry.clone());
        assert_eq!(value["actor"], "escalation-router");
        assert_eq!(value["reasons"], json!(["manual_review"]));

        let parsed: AuditEntry = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_error_message_serialization() {
        let message = ErrorMessage {
            error: ErrorDetails {
                code: ErrorCode::HopLimitExceeded,
                message: "too many hops".to_string(),
            },
            ticket_id: "T-9".to_string(),
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"hop_limit_exceeded\""));

        let parsed: ErrorMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_ticket_status_names() {
        for status in [
            TicketStatus::Resolved,
            TicketStatus::NeedsReview,
            TicketStatus::Escalated,
            TicketStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }
}
