//! Escalation to human review
//!
//! Terminates normal processing: records why the ticket is being escalated,
//! appends an entry to the payload's `recovery_log` and routes straight to
//! the response aggregator.

use crate::config::RoutingSection;
use crate::error::RouteError;
use crate::protocol::messages::{AuditEntry, Envelope};
use crate::protocol::stages::StageId;
use crate::routing::mutator::{RouteMutator, ensure_at_cursor};
use crate::signals::{SentimentLabel, Signals};
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

pub const REASON_GUARDRAIL_FAILURE: &str = "guardrail_failure";
pub const REASON_UNKNOWN_CONFIDENCE: &str = "unknown_confidence";
pub const REASON_LOW_CONFIDENCE: &str = "low_confidence_intent";
pub const REASON_NEGATIVE_SENTIMENT: &str = "negative_sentiment";
pub const REASON_LOW_QUALITY: &str = "low_quality_response";
pub const REASON_MANUAL_REVIEW: &str = "manual_review";

/// Route mutator registered as `escalation-router`
#[derive(Debug, Clone, Default)]
pub struct EscalationRouter {
    thresholds: RoutingSection,
}

impl EscalationRouter {
    pub fn new(thresholds: RoutingSection) -> Self {
        Self { thresholds }
    }

    /// Escalation reasons in reporting order; never empty
    pub fn determine_reasons(&self, signals: &Signals) -> Vec<&'static str> {
        let mut reasons = Vec::new();

        if signals.guardrail_failed() {
            reasons.push(REASON_GUARDRAIL_FAILURE);
        }

        if let Some(intent) = &signals.intent {
            match intent.confidence {
                None => reasons.push(REASON_UNKNOWN_CONFIDENCE),
                Some(c) if c < self.thresholds.low_confidence_threshold => {
                    reasons.push(REASON_LOW_CONFIDENCE)
                }
                Some(_) => {}
            }
        }

        if signals.label() == SentimentLabel::Negative {
            reasons.push(REASON_NEGATIVE_SENTIMENT);
        }

        if signals.refinement_exhausted {
            reasons.push(REASON_LOW_QUALITY);
        }

        if reasons.is_empty() {
            reasons.push(REASON_MANUAL_REVIEW);
        }
        reasons
    }
}

#[async_trait::async_trait]
impl RouteMutator for EscalationRouter {
    fn id(&self) -> StageId {
        StageId::EscalationRouter
    }

    async fn process(&self, mut envelope: Envelope) -> Result<Envelope, RouteError> {
        ensure_at_cursor(&envelope, self.id())?;

        let signals = Signals::from_payload(&envelope.payload);
        let reasons = self.determine_reasons(&signals);

        let entry = AuditEntry {
            actor: self.id(),
            timestamp: Utc::now(),
            reasons: reasons.iter().map(|r| r.to_string()).collect(),
        };

        envelope.payload.set("escalated", true);
        envelope.payload.set(
            "escalation_reasons",
            Value::from(reasons.iter().map(|r| Value::from(*r)).collect::<Vec<_>>()),
        );
        envelope.payload.append_to("recovery_log", Value::from(entry));

        envelope
            .route
            .truncate_and_replace_tail([StageId::ResponseAggregator]);
        envelope.route.advance();

        if reasons == [REASON_MANUAL_REVIEW] {
            info!(ticket_id = %envelope.ticket_id(), "Escalated for manual review");
        } else {
            warn!(ticket_id = %envelope.ticket_id(), reasons = ?reasons, "Ticket escalated");
        }

        Ok(envelope)
    }
}
