//! Ticket intake validation
//!
//! Checks that a ticket carries an id, a way to reach the customer and a
//! non-empty message. Invalid tickets are annotated and keep moving; routing
//! decides what to do with them.

use crate::protocol::messages::Payload;
use crate::protocol::stages::StageId;
use crate::stages::{ContentStage, StageFailure, message_text, now_rfc3339};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct TicketIngester;

impl TicketIngester {
    pub fn new() -> Self {
        Self
    }

    fn validation_errors(payload: &Payload) -> Vec<&'static str> {
        let mut errors = Vec::new();
        if is_blank(payload.get_str("ticket_id")) {
            errors.push("ticket_id is required");
        }
        if is_blank(payload.get_str("customer_id")) && is_blank(payload.get_str("customer_email")) {
            errors.push("customer_id or customer_email is required");
        }
        if is_blank(message_text(payload)) {
            errors.push("message must not be empty");
        }
        errors
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |s| s.trim().is_empty())
}

#[async_trait::async_trait]
impl ContentStage for TicketIngester {
    fn id(&self) -> StageId {
        StageId::TicketIngester
    }

    async fn transform(&self, payload: &Payload) -> Result<Payload, StageFailure> {
        let mut out = payload.clone();
        let errors = Self::validation_errors(payload);
        let message = message_text(payload).unwrap_or("").trim().to_string();

        if !out.contains_key("customer_message") && !message.is_empty() {
            out.set("customer_message", message.clone());
        }
        out.set("message_length", message.chars().count());
        out.set("processed_at", now_rfc3339());

        if errors.is_empty() {
            out.set("validation_status", "valid");
            info!(ticket_id = ?payload.get_str("ticket_id"), "Ticket accepted");
        } else {
            out.set("validation_status", "invalid");
            out.set(
                "validation_errors",
                Value::from(errors.iter().map(|e| Value::from(*e)).collect::<Vec<_>>()),
            );
            warn!(
                ticket_id = ?payload.get_str("ticket_id"),
                errors = ?errors,
                "Ticket failed intake validation"
            );
        }

        Ok(out)
    }
}
