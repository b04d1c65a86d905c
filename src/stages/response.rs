//! Template reply generation and refinement

use crate::protocol::messages::Payload;
use crate::protocol::stages::StageId;
use crate::signals::{SentimentLabel, Signals, Urgency, reply_text};
use crate::stages::{ContentStage, StageFailure, annotate_failure, message_text, now_rfc3339};
use serde_json::{Value, json};
use tracing::{info, warn};

const GENERIC_ACKNOWLEDGEMENT: &str =
    "Thanks for reaching out. We are looking into this and will follow up shortly.";

fn template(intent: &str) -> &'static str {
    match intent {
        "refund_request" => "I understand you want a refund{order}. I'll make sure we process that quickly.",
        "delivery_issue" => "I can check the latest delivery status{order} and keep you updated.",
        "product_issue" => "I'm sorry the product did not meet expectations{order}. I'll help fix this.",
        "billing_inquiry" | "payment_issue" => "I'll review the billing details and clarify any unexpected charges.",
        "order_cancellation" => "I can help cancel the order{order} and confirm once it's done.",
        "shipping_change" => "I can update the shipping details{order} before it leaves the warehouse.",
        "account_update" => "I'll help you regain access to your account safely.",
        "technical_support" | "product_compatibility" => "I'll walk you through the technical details and help you get this working.",
        _ => "I'm here to help and will provide the details you need.",
    }
}

/// Tone chosen from sentiment and urgency
pub fn choose_tone(label: SentimentLabel, urgency: Urgency) -> &'static str {
    if urgency >= Urgency::High {
        return "concise";
    }
    match label {
        SentimentLabel::Negative => "empathetic",
        SentimentLabel::Positive => "cheerful",
        SentimentLabel::Neutral => "professional",
    }
}

/// Default action plan for an intent
pub fn plan_actions(intent: &str) -> Vec<&'static str> {
    match intent {
        "refund_request" => vec!["check_order_status", "process_refund"],
        "delivery_issue" => vec!["provide_tracking_info", "expedite_delivery"],
        "product_issue" => vec!["add_customer_note", "generate_return_label"],
        "order_cancellation" => vec!["cancel_order"],
        "shipping_change" => vec!["update_shipping_address"],
        "account_update" => vec!["schedule_callback"],
        _ => vec!["add_customer_note"],
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseGenerator;

impl ResponseGenerator {
    pub fn new() -> Self {
        Self
    }

    fn compose(signals: &Signals, payload: &Payload, intent: &str, actions: &[&str]) -> String {
        let context = payload.get("context");
        let order = context.and_then(|c| c.get("order"));
        let order_clause = order
            .and_then(|o| o.get("order_id"))
            .and_then(Value::as_str)
            .map(|id| format!(" for order #{id}"))
            .unwrap_or_default();

        let prefix = match signals.label() {
            SentimentLabel::Negative => "I'm sorry you're experiencing this. ",
            SentimentLabel::Positive => "Thank you for the feedback! ",
            SentimentLabel::Neutral => "",
        };
        let mut parts = vec![format!("{prefix}{}", template(intent).replace("{order}", &order_clause))];

        if let Some(status) = order.and_then(|o| o.get("status")).and_then(Value::as_str) {
            parts.push(format!("Current order status: {status}."));
        }
        let tracking = context.and_then(|c| c.get("tracking"));
        if let Some(status) = tracking.and_then(|t| t.get("status")).and_then(Value::as_str) {
            parts.push(format!("Latest tracking update: {status}."));
        }

        let next: Vec<String> = actions.iter().take(2).map(|a| a.replace('_', " ")).collect();
        if !next.is_empty() {
            parts.push(format!("Next steps: {}.", next.join(", ")));
        }

        parts.join(" ")
    }
}

#[async_trait::async_trait]
impl ContentStage for ResponseGenerator {
    fn id(&self) -> StageId {
        StageId::ResponseGenerator
    }

    async fn transform(&self, payload: &Payload) -> Result<Payload, StageFailure> {
        let signals = Signals::from_payload(payload);
        if signals.intent.is_none() && message_text(payload).is_none() {
            return Err(StageFailure::missing_field("intent"));
        }

        let intent = signals.intent_kind().unwrap_or("general_inquiry").to_string();
        let tone = choose_tone(signals.label(), signals.urgency());
        let actions = plan_actions(&intent);
        let text = Self::compose(&signals, payload, &intent, &actions);

        info!(intent = %intent, tone, "Response generated");

        let mut out = payload.clone();
        out.set(
            "response",
            json!({
                "text": text,
                "tone": tone,
                "intent": intent,
                "generated_at": now_rfc3339(),
            }),
        );
        if !out.contains_key("action_plan") {
            out.set(
                "action_plan",
                Value::from(
                    actions
                        .iter()
                        .map(|a| json!({"action": a, "status": "pending"}))
                        .collect::<Vec<_>>(),
                ),
            );
        }
        Ok(out)
    }

    /// Generic acknowledgement
    fn fallback(&self, mut payload: Payload, failure: &StageFailure) -> Payload {
        warn!(error = %failure, "Response generation failed, sending acknowledgement");
        payload.set(
            "response",
            json!({
                "text": GENERIC_ACKNOWLEDGEMENT,
                "tone": "professional",
                "generated_at": now_rfc3339(),
                "error": failure.to_string(),
            }),
        );
        annotate_failure(&mut payload, self.id(), failure);
        payload
    }
}

/// Rewrites a reply the quality gate rejected
///
/// Adds an acknowledgement and an offer of further help. The refinement
/// counter belongs to the quality gate.
#[derive(Debug, Clone, Default)]
pub struct ResponseRefiner;

impl ResponseRefiner {
    pub fn new() -> Self {
        Self
    }

    pub fn refine(reply: &str) -> String {
        let trimmed = reply.trim();
        let lowered = trimmed.to_lowercase();
        let mut refined = String::new();

        if !lowered.contains("thank you") {
            refined.push_str("Thank you for contacting us. ");
        }
        if trimmed.is_empty() {
            refined.push_str("We have received your request and a specialist is reviewing it.");
        } else {
            refined.push_str(trimmed);
        }
        if !lowered.contains("help") {
            refined.push_str(" Please let us know if there is anything else we can help with.");
        }
        refined
    }
}

#[async_trait::async_trait]
impl ContentStage for ResponseRefiner {
    fn id(&self) -> StageId {
        StageId::ResponseRefiner
    }

    async fn transform(&self, payload: &Payload) -> Result<Payload, StageFailure> {
        let previous = reply_text(payload).ok_or_else(|| StageFailure::missing_field("response"))?;
        let refined = Self::refine(&previous);

        let mut out = payload.clone();
        let mut response = match payload.get("response") {
            Some(Value::Object(record)) => record.clone(),
            _ => serde_json::Map::new(),
        };
        response.insert("text".into(), refined.into());
        response.insert("refined_at".into(), now_rfc3339().into());
        out.set("response", Value::Object(response));
        out.append_to("refinement_history", previous);
        Ok(out)
    }
}
