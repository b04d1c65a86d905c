//! Simulated execution of the ticket's action plan
//!
//! No external systems are called; each action is marked completed with a
//! short description of what would have happened.

use crate::protocol::messages::Payload;
use crate::protocol::stages::StageId;
use crate::signals::Signals;
use crate::stages::response::plan_actions;
use crate::stages::{ContentStage, StageFailure, annotate_failure, now_rfc3339};
use serde_json::{Value, json};
use tracing::info;

fn describe(action: &str, payload: &Payload) -> String {
    let context = payload.get("context");
    let lookup = |section: &str, key: &str| {
        context
            .and_then(|c| c.get(section))
            .and_then(|s| s.get(key))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    };
    match action {
        "process_refund" => "Issued refund to the original payment method".to_string(),
        "provide_tracking_info" => format!("Shared tracking status: {}", lookup("tracking", "status")),
        "cancel_order" => "Submitted cancellation request to fulfillment team".to_string(),
        "expedite_delivery" => "Requested carrier to prioritize the shipment".to_string(),
        "check_order_status" => format!("Order status: {}", lookup("order", "status")),
        _ => "Logged the conversation for follow-up".to_string(),
    }
}

/// Action names from `action_plan` entries, which may be strings or records
fn planned_actions(plan: &[Value]) -> Vec<String> {
    plan.iter()
        .filter_map(|entry| match entry {
            Value::String(name) => Some(name.clone()),
            Value::Object(record) => record
                .get("action")
                .or_else(|| record.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionCoordinator;

impl ExecutionCoordinator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ContentStage for ExecutionCoordinator {
    fn id(&self) -> StageId {
        StageId::ExecutionCoordinator
    }

    async fn transform(&self, payload: &Payload) -> Result<Payload, StageFailure> {
        let actions = match payload.get("action_plan") {
            Some(Value::Array(plan)) => planned_actions(plan),
            Some(_) => {
                return Err(StageFailure::invalid_field("action_plan", "expected a list"));
            }
            None => {
                let signals = Signals::from_payload(payload);
                plan_actions(signals.intent_kind().unwrap_or("general_inquiry"))
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            }
        };

        let order_id = payload
            .get("context")
            .and_then(|c| c.get("order"))
            .and_then(|o| o.get("order_id"))
            .cloned()
            .unwrap_or(Value::Null);
        let results: Vec<Value> = actions
            .iter()
            .map(|action| {
                json!({
                    "action": action,
                    "status": "completed",
                    "detail": describe(action, payload),
                    "order_id": order_id,
                })
            })
            .collect();

        info!(actions = results.len(), "Action plan executed");

        let mut out = payload.clone();
        out.set(
            "execution_result",
            json!({
                "status": "completed",
                "results": results,
                "executed_at": now_rfc3339(),
            }),
        );
        Ok(out)
    }

    /// Errored execution result with no completed actions
    fn fallback(&self, mut payload: Payload, failure: &StageFailure) -> Payload {
        payload.set(
            "execution_result",
            json!({
                "status": "error",
                "results": [],
                "error": failure.to_string(),
                "executed_at": now_rfc3339(),
            }),
        );
        annotate_failure(&mut payload, self.id(), failure);
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_infers_plan_from_intent() {
        let payload = Payload::new()
            .with("intent", json!({"intent": "refund_request"}))
            .with("context", json!({"order": {"order_id": "12345", "status": "shipped"}}));
        let out = ExecutionCoordinator::new().transform(&payload).await.unwrap();

        let results = out.get("execution_result").unwrap()["results"].as_array().unwrap().clone();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["detail"], "Order status: shipped");
        assert_eq!(results[1]["action"], "process_refund");
        assert_eq!(results[1]["order_id"], "12345");
    }

    #[tokio::test]
    async fn test_mixed_plan_entries() {
        let payload = Payload::new().with(
            "action_plan",
            json!(["cancel_order", {"name": "expedite_delivery"}, 42]),
        );
        let out = ExecutionCoordinator::new().transform(&payload).await.unwrap();
        let results = &out.get("execution_result").unwrap()["results"];
        assert_eq!(results.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_plan_falls_back() {
        let stage = ExecutionCoordinator::new();
        let payload = Payload::new().with("action_plan", "refund everything");
        let failure = stage.transform(&payload).await.unwrap_err();
        let out = stage.fallback(payload, &failure);
        assert_eq!(out.get("execution_result").unwrap()["status"], "error");
    }
}
