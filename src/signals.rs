//! Canonical signal records read from a ticket payload
//!
//! Upstream stages do not agree on one payload shape. The sentiment record may
//! be a bare label or a nested analyzer record, intent may be a string or a
//! record, and guardrail results live under either `guardrail` or
//! `guardrail_check`. [`Signals::from_payload`] folds all of these into one
//! typed view so routers never inspect raw JSON.
//!
//! Every signal is optional. Absent or unrecognized values read as neutral:
//! neutral sentiment, low urgency, no intent, passed guardrail.

use crate::protocol::messages::Payload;
use crate::stages::intent::GENERAL_INQUIRY;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl SentimentLabel {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sentiment {
    pub label: SentimentLabel,
    /// Strength of the label in [0, 1]
    pub intensity: f64,
    pub urgency: Urgency,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub kind: String,
    /// `None` when the classifier reported no usable confidence
    pub confidence: Option<f64>,
    pub entities: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CustomerContext {
    pub tier: Option<String>,
    pub order_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Guardrail {
    pub passed: bool,
    pub issues: Vec<Value>,
}

/// Typed view over the routing-relevant parts of a payload
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signals {
    pub sentiment: Option<Sentiment>,
    pub intent: Option<Intent>,
    pub context: Option<CustomerContext>,
    pub guardrail: Option<Guardrail>,
    pub reply: Option<String>,
    /// Set by the quality gate once its refinement budget is spent
    pub refinement_exhausted: bool,
}

impl Signals {
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            sentiment: read_sentiment(payload),
            intent: read_intent(payload),
            context: read_context(payload),
            guardrail: read_guardrail(payload),
            reply: reply_text(payload),
            refinement_exhausted: payload.get_bool("refinement_exhausted").unwrap_or(false),
        }
    }

    pub fn label(&self) -> SentimentLabel {
        self.sentiment.as_ref().map(|s| s.label).unwrap_or_default()
    }

    pub fn intensity(&self) -> f64 {
        self.sentiment.as_ref().map(|s| s.intensity).unwrap_or(0.0)
    }

    pub fn urgency(&self) -> Urgency {
        self.sentiment.as_ref().map(|s| s.urgency).unwrap_or_default()
    }

    pub fn intent_kind(&self) -> Option<&str> {
        self.intent.as_ref().map(|i| i.kind.as_str())
    }

    /// True when the intent kind is one of `kinds`
    pub fn intent_is_any(&self, kinds: &[&str]) -> bool {
        self.intent_kind().is_some_and(|kind| kinds.contains(&kind))
    }

    pub fn is_vip(&self) -> bool {
        self.context
            .as_ref()
            .and_then(|c| c.tier.as_deref())
            .is_some_and(|tier| tier.eq_ignore_ascii_case("vip"))
    }

    pub fn order_count(&self) -> usize {
        self.context.as_ref().map(|c| c.order_count).unwrap_or(0)
    }

    /// A missing guardrail record counts as passed
    pub fn guardrail_failed(&self) -> bool {
        self.guardrail.as_ref().is_some_and(|g| !g.passed)
    }
}

/// Extract the reply text from `response`, which may be a string or a record
/// carrying `text` / `response_text`
pub fn reply_text(payload: &Payload) -> Option<String> {
    match payload.get("response")? {
        Value::String(text) => Some(text.clone()),
        Value::Object(record) => record
            .get("text")
            .or_else(|| record.get("response_text"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Read a number that may have been serialized as a string
fn lenient_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn read_urgency(value: &Value) -> Option<Urgency> {
    match value {
        Value::String(s) => Urgency::parse(s),
        Value::Object(record) => record.get("level").and_then(Value::as_str).and_then(Urgency::parse),
        _ => None,
    }
}

fn read_sentiment(payload: &Payload) -> Option<Sentiment> {
    let raw = payload.get("sentiment")?;
    let top_level_urgency = payload.get("urgency").and_then(read_urgency);

    match raw {
        Value::String(label) => Some(Sentiment {
            label: SentimentLabel::parse(label).unwrap_or_default(),
            intensity: payload
                .get("intensity")
                .and_then(lenient_f64)
                .unwrap_or(0.0)
                .clamp(0.0, 1.0),
            urgency: top_level_urgency.unwrap_or_default(),
        }),
        Value::Object(record) => {
            // Nested analyzer shape keeps the label under `sentiment`
            let nested = record.get("sentiment");
            let label = record
                .get("label")
                .and_then(Value::as_str)
                .or_else(|| nested.and_then(Value::as_str))
                .or_else(|| nested.and_then(|n| n.get("label")).and_then(Value::as_str))
                .and_then(SentimentLabel::parse)
                .unwrap_or_default();

            let intensity = record
                .get("intensity")
                .or_else(|| nested.and_then(|n| n.get("intensity")))
                .or_else(|| nested.and_then(|n| n.get("confidence")))
                .or_else(|| record.get("confidence"))
                .and_then(lenient_f64)
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);

            let urgency = record
                .get("urgency")
                .and_then(read_urgency)
                .or(top_level_urgency)
                .unwrap_or_default();

            Some(Sentiment {
                label,
                intensity,
                urgency,
            })
        }
        _ => None,
    }
}

fn read_intent(payload: &Payload) -> Option<Intent> {
    match payload.get("intent")? {
        Value::String(kind) => Some(Intent {
            kind: kind.clone(),
            confidence: payload.get("confidence").and_then(lenient_f64),
            entities: Map::new(),
        }),
        Value::Object(record) => {
            // A record without a kind still carries its confidence
            let kind = record
                .get("intent")
                .or_else(|| record.get("kind"))
                .and_then(Value::as_str)
                .unwrap_or(GENERAL_INQUIRY)
                .to_string();
            Some(Intent {
                kind,
                confidence: record.get("confidence").and_then(lenient_f64),
                entities: record
                    .get("entities")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            })
        }
        _ => None,
    }
}

fn read_context(payload: &Payload) -> Option<CustomerContext> {
    let record = payload.get("context").and_then(Value::as_object);
    let flat_tier = payload.get_str("customer_tier").map(str::to_string);

    if record.is_none() && flat_tier.is_none() {
        return None;
    }

    let tier = record
        .and_then(|r| r.get("customer"))
        .and_then(|c| c.get("tier"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or(flat_tier);
    let order_count = record
        .and_then(|r| r.get("orders"))
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);

    Some(CustomerContext { tier, order_count })
}

fn read_guardrail(payload: &Payload) -> Option<Guardrail> {
    let record = payload
        .get("guardrail")
        .or_else(|| payload.get("guardrail_check"))?
        .as_object()?;

    let passed = record
        .get("passed")
        .or_else(|| record.get("pass"))
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let issues = record
        .get("issues")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Some(Guardrail { passed, issues })
}
