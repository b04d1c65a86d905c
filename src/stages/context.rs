//! Customer, order and tracking lookup
//!
//! Backed by an in-memory table standing in for the CRM and order systems.

use crate::protocol::messages::Payload;
use crate::protocol::stages::StageId;
use crate::stages::{ContentStage, StageFailure, annotate_failure, message_text, now_rfc3339};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{debug, warn};

static CUSTOMERS: Lazy<Vec<Value>> = Lazy::new(|| {
    vec![
        json!({"id": "cust_001", "name": "John Doe", "tier": "premium", "email": "user@example.com"}),
        json!({"id": "cust_002", "name": "Casey VIP", "tier": "VIP", "email": "vip@example.com"}),
        json!({"id": "cust_003", "name": "Bulk Buyer Ltd", "tier": "business", "email": "orders@bulkbuyer.example"}),
    ]
});

static ORDERS: Lazy<Vec<Value>> = Lazy::new(|| {
    let mut orders = vec![
        json!({
            "order_id": "12345", "customer_id": "cust_001", "items": ["Wireless Headphones"],
            "status": "shipped", "tracking_id": "1Z999AA10123456784", "expected_delivery": "2025-10-02"
        }),
        json!({
            "order_id": "98765", "customer_id": "cust_002", "items": ["Coffee Machine"],
            "status": "processing", "tracking_id": null, "expected_delivery": "2025-10-05"
        }),
    ];
    orders.extend((0..6).map(|n| {
        json!({
            "order_id": format!("5500{n}"), "customer_id": "cust_003", "items": ["Office Chairs"],
            "status": "delivered", "tracking_id": null
        })
    }));
    orders
});

static TRACKING: Lazy<Vec<Value>> = Lazy::new(|| {
    vec![json!({
        "tracking_id": "1Z999AA10123456784", "status": "in_transit",
        "location": "Distribution Center", "expected_delivery": "2025-10-02"
    })]
});

static BARE_ORDER_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{5,})\b").expect("order number pattern is valid"));

fn field<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

#[derive(Debug, Clone, Default)]
pub struct ContextRetriever;

impl ContextRetriever {
    pub fn new() -> Self {
        Self
    }

    fn find_customer(payload: &Payload) -> Option<&'static Value> {
        if let Some(email) = payload.get_str("customer_email") {
            let email = email.trim().to_lowercase();
            return CUSTOMERS.iter().find(|c| field(c, "email") == Some(email.as_str()));
        }
        let id = payload.get_str("customer_id")?;
        CUSTOMERS.iter().find(|c| field(c, "id") == Some(id))
    }

    fn order_number(payload: &Payload) -> Option<String> {
        let from_entities = payload
            .get("intent")
            .and_then(|i| i.get("entities"))
            .and_then(|e| e.get("order_number").or_else(|| e.get("order_id")))
            .and_then(Value::as_str);
        if let Some(number) = from_entities {
            return Some(number.to_string());
        }
        let message = message_text(payload)?;
        BARE_ORDER_NUMBER
            .captures(message)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

#[async_trait::async_trait]
impl ContentStage for ContextRetriever {
    fn id(&self) -> StageId {
        StageId::ContextRetriever
    }

    async fn transform(&self, payload: &Payload) -> Result<Payload, StageFailure> {
        if payload.get_str("customer_email").is_none() && payload.get_str("customer_id").is_none() {
            return Err(StageFailure::missing_field("customer_email"));
        }

        let customer = Self::find_customer(payload);
        let customer_id = customer.and_then(|c| field(c, "id"));

        let order = Self::order_number(payload)
            .and_then(|number| ORDERS.iter().find(|o| field(o, "order_id") == Some(number.as_str())))
            // Never expose another customer's order
            .filter(|o| customer_id.is_none() || field(o, "customer_id") == customer_id);

        let orders: Vec<&Value> = match customer_id {
            Some(id) => ORDERS
                .iter()
                .filter(|o| field(o, "customer_id") == Some(id))
                .collect(),
            None => Vec::new(),
        };

        let tracking = order
            .and_then(|o| field(o, "tracking_id"))
            .and_then(|tid| TRACKING.iter().find(|t| field(t, "tracking_id") == Some(tid)));

        let mut missing = Vec::new();
        if customer.is_none() {
            missing.push("customer");
        }
        if order.is_none() {
            missing.push("order");
        }

        debug!(
            customer = ?customer_id,
            orders = orders.len(),
            tracking = tracking.is_some(),
            "Context retrieved"
        );

        let mut out = payload.clone();
        out.set(
            "context",
            json!({
                "customer": customer.cloned().unwrap_or_else(|| json!({"tier": "unknown"})),
                "order": order.cloned().unwrap_or_else(|| json!({})),
                "orders": orders,
                "tracking": tracking.cloned().unwrap_or_else(|| json!({})),
                "missing": missing,
                "retrieved_at": now_rfc3339(),
            }),
        );
        Ok(out)
    }

    /// Empty context carrying the error
    fn fallback(&self, mut payload: Payload, failure: &StageFailure) -> Payload {
        warn!(error = %failure, "Context retrieval failed, continuing without context");
        payload.set(
            "context",
            json!({
                "customer": {},
                "order": {},
                "orders": [],
                "tracking": {},
                "error": failure.to_string(),
            }),
        );
        annotate_failure(&mut payload, self.id(), failure);
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Signals;

    #[tokio::test]
    async fn test_known_customer_with_order() {
        let payload = Payload::new()
            .with("customer_email", "User@Example.com")
            .with("customer_message", "Where is order 12345?");
        let out = ContextRetriever::new().transform(&payload).await.unwrap();

        let context = out.get("context").unwrap();
        assert_eq!(context["customer"]["id"], "cust_001");
        assert_eq!(context["order"]["order_id"], "12345");
        assert_eq!(context["tracking"]["status"], "in_transit");
    }

    #[tokio::test]
    async fn test_other_customers_order_is_hidden() {
        let payload = Payload::new()
            .with("customer_email", "user@example.com")
            .with("customer_message", "Status of 98765?");
        let out = ContextRetriever::new().transform(&payload).await.unwrap();
        assert_eq!(out.get("context").unwrap()["order"], json!({}));
    }

    #[tokio::test]
    async fn test_vip_and_order_history_feed_signals() {
        let vip = ContextRetriever::new()
            .transform(&Payload::new().with("customer_email", "vip@example.com"))
            .await
            .unwrap();
        assert!(Signals::from_payload(&vip).is_vip());

        let bulk = ContextRetriever::new()
            .transform(&Payload::new().with("customer_id", "cust_003"))
            .await
            .unwrap();
        assert_eq!(Signals::from_payload(&bulk).order_count(), 6);
    }

    #[tokio::test]
    async fn test_missing_identity_falls_back() {
        let stage = ContextRetriever::new();
        let failure = stage.transform(&Payload::new()).await.unwrap_err();
        let out = stage.fallback(Payload::new(), &failure);
        assert_eq!(out.get("context").unwrap()["orders"], json!([]));
        assert!(out.get("context").unwrap()["error"].is_string());
    }
}
