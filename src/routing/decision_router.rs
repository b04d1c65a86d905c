//! Signal-driven route rewriting
//!
//! The decision router looks at the signals accumulated so far and reshapes
//! the remaining route. Rules are evaluated in a fixed priority order:
//!
//! 1. **Immediate escalation** short-circuits everything else and replaces
//!    the suffix with `[escalation-router, response-aggregator]`
//! 2. **Priority processing** pulls `response-generator` into the next two
//!    slots
//! 3. **Action execution** schedules `execution-coordinator` ahead of the
//!    response generator
//! 4. **Low confidence** schedules `escalation-router` ahead of the aggregator
//! 5. **Complex query** schedules `context-retriever` right after the cursor
//!
//! Rules 2-5 are independent and may all fire. The names of the rules that
//! fired are appended to `routing_decisions` on the payload.

use crate::config::RoutingSection;
use crate::error::RouteError;
use crate::protocol::messages::Envelope;
use crate::protocol::stages::StageId;
use crate::routing::mutator::{RouteMutator, ensure_at_cursor};
use crate::routing::plan::RoutePlan;
use crate::signals::{SentimentLabel, Signals, Urgency};
use std::fmt;
use tracing::{debug, info};

const ESCALATION_INTENTS: &[&str] = &["legal_threat", "formal_complaint", "regulatory_complaint"];

const PRIORITY_INTENTS: &[&str] = &["billing_inquiry", "refund_request", "payment_issue"];

const ACTIONABLE_INTENTS: &[&str] = &[
    "refund_request",
    "order_modification",
    "shipping_change",
    "billing_update",
    "account_update",
    "order_cancellation",
];

const COMPLEX_INTENTS: &[&str] = &["technical_support", "product_compatibility", "bulk_order"];

/// Pending slots checked before priority processing inserts a generator
const PRIORITY_WINDOW: usize = 2;

/// Routing rule that fired for a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingRule {
    ImmediateEscalation,
    PriorityProcessing,
    ActionExecution,
    LowConfidence,
    ComplexProcessing,
}

impl RoutingRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingRule::ImmediateEscalation => "immediate_escalation",
            RoutingRule::PriorityProcessing => "priority_processing",
            RoutingRule::ActionExecution => "action_execution",
            RoutingRule::LowConfidence => "low_confidence",
            RoutingRule::ComplexProcessing => "complex_processing",
        }
    }
}

impl fmt::Display for RoutingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route mutator registered as `decision-router`
#[derive(Debug, Clone, Default)]
pub struct DecisionRouter {
    thresholds: RoutingSection,
}

impl DecisionRouter {
    pub fn new(thresholds: RoutingSection) -> Self {
        Self { thresholds }
    }

    /// Apply the rules to `route` without advancing the cursor
    ///
    /// Returns the rules that fired, in evaluation order.
    pub fn apply_rules(&self, signals: &Signals, route: &mut RoutePlan) -> Vec<RoutingRule> {
        if self.should_escalate_immediately(signals) {
            route.truncate_and_replace_tail([
                StageId::EscalationRouter,
                StageId::ResponseAggregator,
            ]);
            return vec![RoutingRule::ImmediateEscalation];
        }

        let mut fired = Vec::new();

        if self.needs_priority_processing(signals) {
            route.ensure_within(StageId::ResponseGenerator, PRIORITY_WINDOW);
            fired.push(RoutingRule::PriorityProcessing);
        }

        if self.needs_action_execution(signals) {
            if !route.pending_contains(StageId::ExecutionCoordinator) {
                route.insert_before(StageId::ResponseGenerator, StageId::ExecutionCoordinator);
            }
            fired.push(RoutingRule::ActionExecution);
        }

        if self.has_low_confidence(signals) {
            if !route.pending_contains(StageId::EscalationRouter) {
                route.insert_before(StageId::ResponseAggregator, StageId::EscalationRouter);
            }
            fired.push(RoutingRule::LowConfidence);
        }

        if self.is_complex_query(signals) {
            route.append_if_absent(StageId::ContextRetriever);
            fired.push(RoutingRule::ComplexProcessing);
        }

        fired
    }

    fn should_escalate_immediately(&self, signals: &Signals) -> bool {
        let urgency = signals.urgency();
        if urgency == Urgency::Critical {
            return true;
        }
        if signals.label() == SentimentLabel::Negative
            && signals.intensity() > self.thresholds.escalation_intensity_threshold
        {
            return true;
        }
        if signals.intent_is_any(ESCALATION_INTENTS) {
            return true;
        }
        signals.is_vip() && urgency >= Urgency::High
    }

    fn needs_priority_processing(&self, signals: &Signals) -> bool {
        signals.urgency() == Urgency::High || signals.intent_is_any(PRIORITY_INTENTS)
    }

    fn needs_action_execution(&self, signals: &Signals) -> bool {
        signals.intent_is_any(ACTIONABLE_INTENTS)
    }

    /// Unavailable confidence is not treated as low here; the escalation
    /// router reports it separately
    fn has_low_confidence(&self, signals: &Signals) -> bool {
        signals
            .intent
            .as_ref()
            .and_then(|intent| intent.confidence)
            .is_some_and(|confidence| confidence < self.thresholds.low_confidence_threshold)
    }

    fn is_complex_query(&self, signals: &Signals) -> bool {
        signals.order_count() > self.thresholds.complex_order_count
            || signals.intent_is_any(COMPLEX_INTENTS)
    }
}

#[async_trait::async_trait]
impl RouteMutator for DecisionRouter {
    fn id(&self) -> StageId {
        StageId::DecisionRouter
    }

    async fn process(&self, mut envelope: Envelope) -> Result<Envelope, RouteError> {
        ensure_at_cursor(&envelope, self.id())?;

        let signals = Signals::from_payload(&envelope.payload);
        let fired = self.apply_rules(&signals, &mut envelope.route);

        if fired.is_empty() {
            debug!(ticket_id = %envelope.ticket_id(), "No routing rules fired");
        } else {
            info!(
                ticket_id = %envelope.ticket_id(),
                rules = ?fired.iter().map(RoutingRule::as_str).collect::<Vec<_>>(),
                pending = ?envelope.route.pending(),
                "Route rewritten"
            );
        }

        for rule in &fired {
            envelope.payload.append_to("routing_decisions", rule.as_str());
        }

        envelope.route.advance();
        Ok(envelope)
    }
}
