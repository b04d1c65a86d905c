//! Final response assembly
//!
//! Writes `final_response` with the ticket's terminal status:
//! `escalated` when the escalation router ran, `needs_review` when the
//! guardrail check or quality gate failed, `resolved` otherwise.

use crate::protocol::messages::{Payload, TicketStatus};
use crate::protocol::stages::StageId;
use crate::signals::Signals;
use crate::stages::{ContentStage, StageFailure, now_rfc3339};
use serde_json::{Value, json};
use tracing::info;

pub fn resolve_status(payload: &Payload, signals: &Signals) -> TicketStatus {
    if payload.get_bool("escalated").unwrap_or(false) {
        TicketStatus::Escalated
    } else if signals.guardrail_failed() || payload.get_bool("validation_passed") == Some(false) {
        TicketStatus::NeedsReview
    } else {
        TicketStatus::Resolved
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseAggregator;

impl ResponseAggregator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ContentStage for ResponseAggregator {
    fn id(&self) -> StageId {
        StageId::ResponseAggregator
    }

    async fn transform(&self, payload: &Payload) -> Result<Payload, StageFailure> {
        let signals = Signals::from_payload(payload);
        let status = resolve_status(payload, &signals);

        info!(
            ticket_id = ?payload.get_str("ticket_id"),
            status = status.as_str(),
            "Ticket aggregated"
        );

        let mut out = payload.clone();
        out.set(
            "final_response",
            json!({
                "ticket_id": payload.get("ticket_id").cloned().unwrap_or(Value::Null),
                "customer_email": payload.get("customer_email").cloned().unwrap_or(Value::Null),
                "response": signals.reply.clone().unwrap_or_default(),
                "status": status,
                "intent": signals.intent_kind(),
                "sentiment": signals.sentiment.as_ref().map(|s| s.label),
                "escalation_reasons": payload.get("escalation_reasons").cloned().unwrap_or_else(|| json!([])),
                "execution": payload.get("execution_result").cloned().unwrap_or_else(|| json!({})),
                "completed_at": now_rfc3339(),
            }),
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_statuses() {
        let stage = ResponseAggregator::new();

        let resolved = stage
            .transform(&Payload::new().with("response", "All sorted, thanks for waiting."))
            .await
            .unwrap();
        assert_eq!(resolved.get("final_response").unwrap()["status"], "resolved");

        let review = stage
            .transform(&Payload::new().with("guardrail_check", json!({"pass": false})))
            .await
            .unwrap();
        assert_eq!(review.get("final_response").unwrap()["status"], "needs_review");

        let escalated = stage
            .transform(
                &Payload::new()
                    .with("escalated", true)
                    .with("guardrail_check", json!({"pass": false})),
            )
            .await
            .unwrap();
        assert_eq!(escalated.get("final_response").unwrap()["status"], "escalated");
    }
}
