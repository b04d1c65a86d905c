//! Keyword intent classification and entity extraction

use crate::protocol::messages::Payload;
use crate::protocol::stages::StageId;
use crate::stages::{ContentStage, StageFailure, annotate_failure, message_text, now_rfc3339};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

/// Intent chosen when no rule matches, and by the fallback
pub const GENERAL_INQUIRY: &str = "general_inquiry";

const FALLBACK_CONFIDENCE: f64 = 0.25;

/// Keyword rules, checked in order; the rule with the most hits wins and
/// earlier rules win ties
const INTENT_RULES: &[(&str, &[&str])] = &[
    ("legal_threat", &["lawyer", "attorney", "sue ", "legal action", "court"]),
    ("formal_complaint", &["formal complaint", "file a complaint", "ombudsman"]),
    ("refund_request", &["refund", "money back", "return", "exchange"]),
    ("order_cancellation", &["cancel", "do not ship", "wrong order"]),
    ("shipping_change", &["change address", "shipping address", "deliver to"]),
    ("delivery_issue", &["late", "delayed", "delay", "where is", "arrive", "delivery"]),
    ("product_issue", &["broken", "defect", "damaged", "not working", "faulty"]),
    ("payment_issue", &["charged twice", "declined", "payment failed", "double charge"]),
    ("billing_inquiry", &["charge", "billing", "invoice", "payment"]),
    ("account_update", &["login", "password", "account", "profile"]),
    ("technical_support", &["error", "crash", "bug", "install", "setup"]),
    ("product_compatibility", &["compatible", "compatibility", "work with"]),
    ("bulk_order", &["bulk", "wholesale", "100 units"]),
];

static ORDER_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:order|#|no\.?)\s*#?(\d{5,})\b").expect("order pattern is valid")
});
static TRACKING_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b1Z[0-9A-Z]{10,}\b").expect("tracking pattern is valid"));
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern is valid")
});

/// Best matching intent and the keywords that matched it
pub fn detect_intent(lowered: &str) -> (&'static str, Vec<&'static str>) {
    let mut best = (GENERAL_INQUIRY, Vec::new());
    for &(intent, keywords) in INTENT_RULES {
        let hits: Vec<&'static str> = keywords
            .iter()
            .copied()
            .filter(|kw| lowered.contains(kw))
            .collect();
        if hits.len() > best.1.len() {
            best = (intent, hits);
        }
    }
    best
}

pub fn extract_entities(message: &str) -> Map<String, Value> {
    let mut entities = Map::new();
    if let Some(number) = ORDER_NUMBER.captures(message).and_then(|c| c.get(1)) {
        entities.insert("order_number".into(), number.as_str().into());
    }
    if let Some(tracking) = TRACKING_ID.find(message) {
        entities.insert("tracking_id".into(), tracking.as_str().into());
    }
    if let Some(email) = EMAIL.find(message) {
        entities.insert("email".into(), email.as_str().into());
    }
    entities
}

/// 0.35 base, 0.1 per matched keyword (up to three), 0.1 when any entity
/// was found, capped at 0.95
pub fn intent_confidence(matched_keywords: usize, has_entities: bool) -> f64 {
    let mut score = 0.35 + 0.1 * matched_keywords.min(3) as f64;
    if has_entities {
        score += 0.1;
    }
    score.min(0.95)
}

#[derive(Debug, Clone, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ContentStage for IntentClassifier {
    fn id(&self) -> StageId {
        StageId::IntentClassifier
    }

    async fn transform(&self, payload: &Payload) -> Result<Payload, StageFailure> {
        let message =
            message_text(payload).ok_or_else(|| StageFailure::missing_field("customer_message"))?;

        let (intent, matched) = detect_intent(&message.to_lowercase());
        let entities = extract_entities(message);
        let confidence = intent_confidence(matched.len(), !entities.is_empty());

        info!(
            intent,
            confidence,
            entities = ?entities.keys().collect::<Vec<_>>(),
            "Intent detected"
        );

        let mut out = payload.clone();
        out.set(
            "intent",
            json!({
                "intent": intent,
                "confidence": confidence,
                "entities": entities,
                "matched_keywords": matched,
                "analysis_method": "rule_based",
                "detected_at": now_rfc3339(),
            }),
        );
        Ok(out)
    }

    /// `general_inquiry` at confidence 0.25
    fn fallback(&self, mut payload: Payload, failure: &StageFailure) -> Payload {
        warn!(error = %failure, "Intent classification failed, using general inquiry");
        payload.set(
            "intent",
            json!({
                "intent": GENERAL_INQUIRY,
                "confidence": FALLBACK_CONFIDENCE,
                "entities": {},
                "analysis_method": "error_fallback",
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

    #[test]
    fn test_detect_intent() {
        assert_eq!(detect_intent("i want my money back, please refund").0, "refund_request");
        assert_eq!(detect_intent("where is my delivery? it is late").0, "delivery_issue");
        assert_eq!(detect_intent("hello").0, GENERAL_INQUIRY);
        assert!(detect_intent("hello").1.is_empty());
    }

    #[test]
    fn test_extract_entities() {
        let entities =
            extract_entities("Order #12345 via 1Z999AA10123456784, reach me at a.b@example.com");
        assert_eq!(entities["order_number"], "12345");
        assert_eq!(entities["tracking_id"], "1Z999AA10123456784");
        assert_eq!(entities["email"], "a.b@example.com");
    }

    #[test]
    fn test_confidence_formula() {
        assert!((intent_confidence(0, false) - 0.35).abs() < 1e-9);
        assert!((intent_confidence(2, true) - 0.65).abs() < 1e-9);
        assert!((intent_confidence(10, true) - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_transform_and_fallback() {
        let stage = IntentClassifier::new();
        let out = stage
            .transform(&Payload::new().with("message", "Please refund order 12345"))
            .await
            .unwrap();
        let intent = Signals::from_payload(&out).intent.unwrap();
        assert_eq!(intent.kind, "refund_request");
        assert!((intent.confidence.unwrap() - 0.55).abs() < 1e-9);

        let failure = stage.transform(&Payload::new()).await.unwrap_err();
        let out = stage.fallback(Payload::new(), &failure);
        let intent = Signals::from_payload(&out).intent.unwrap();
        assert_eq!(intent.kind, GENERAL_INQUIRY);
        assert_eq!(intent.confidence, Some(0.25));
    }
}
