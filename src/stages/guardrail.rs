//! Rule-based reply guardrails
//!
//! Flags unauthorized promises, PII-looking numbers and overlong replies.
//! Writes `guardrail_check {pass, issues, recommended_action}`.

use crate::protocol::messages::Payload;
use crate::protocol::stages::StageId;
use crate::signals::reply_text;
use crate::stages::{ContentStage, StageFailure, annotate_failure, now_rfc3339};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use tracing::{info, warn};

const MAX_REPLY_CHARS: usize = 2000;

static UNAUTHORIZED_PROMISES: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)guarantee",
        r"(?i)will\s+definitely",
        r"(?i)promise\s+you",
        r"(?i)for\s+sure",
        r"(?i)100%\s+refun",
    ])
});

static PII_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\b\d{3}-\d{2}-\d{4}\b",
        r"\b\d{4}\s\d{4}\s\d{4}\s\d{4}\b",
        r"\b\d{15,16}\b",
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("guardrail patterns are valid"))
        .collect()
}

/// Issues found in `reply`; empty means the reply may be delivered
pub fn check_reply(reply: &str) -> Vec<Value> {
    let mut issues = Vec::new();
    for (patterns, kind) in [
        (&*UNAUTHORIZED_PROMISES, "unauthorized_promise"),
        (&*PII_PATTERNS, "pii_risk"),
    ] {
        for pattern in patterns.iter().filter(|p| p.is_match(reply)) {
            issues.push(json!({"type": kind, "pattern": pattern.as_str(), "severity": "high"}));
        }
    }
    if reply.chars().count() > MAX_REPLY_CHARS {
        issues.push(json!({"type": "length", "message": "Response too long", "severity": "low"}));
    }
    issues
}

#[derive(Debug, Clone, Default)]
pub struct GuardrailValidator;

impl GuardrailValidator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ContentStage for GuardrailValidator {
    fn id(&self) -> StageId {
        StageId::GuardrailValidator
    }

    async fn transform(&self, payload: &Payload) -> Result<Payload, StageFailure> {
        let reply = reply_text(payload).unwrap_or_default();
        let issues = if reply.trim().is_empty() {
            vec![json!({"type": "missing_response", "message": "No response text to validate"})]
        } else {
            check_reply(&reply)
        };
        let passed = issues.is_empty();

        if passed {
            info!("Guardrail validation passed");
        } else {
            warn!(issues = issues.len(), "Guardrail validation failed");
        }

        let mut out = payload.clone();
        out.set(
            "guardrail_check",
            json!({
                "pass": passed,
                "issues": issues,
                "recommended_action": if passed { "deliver" } else { "regenerate" },
                "validated_at": now_rfc3339(),
            }),
        );
        Ok(out)
    }

    /// Failed check carrying the error as a high severity issue
    fn fallback(&self, mut payload: Payload, failure: &StageFailure) -> Payload {
        payload.set(
            "guardrail_check",
            json!({
                "pass": false,
                "issues": [{"type": "error", "message": failure.to_string(), "severity": "high"}],
                "validated_at": now_rfc3339(),
            }),
        );
        annotate_failure(&mut payload, self.id(), failure);
        payload
    }
}
