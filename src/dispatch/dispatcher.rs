//! Ticket dispatcher
//!
//! Drives one envelope along its route: look up the handler for the stage at
//! the cursor, invoke it, check the result, repeat. The ticket is finished
//! once the stage at the last position has run without extending the route.
//!
//! ```text
//! loop:
//!   hop ceiling reached?             -> fail (HopLimitExceeded)
//!   handler = registry[current]      -> fail (StageNotRegistered)
//!   Content: payload = transform | fallback; route.advance()
//!   Mutator: envelope = process(envelope); check contract
//!   last stage ran and cursor stayed -> finish
//! ```
//!
//! Mutator contract, checked after every call:
//! - the stages up to and including the old cursor are unchanged
//! - the cursor moved forward by exactly one, or stayed because the mutator
//!   ran on the last stage and left no successor
//!
//! Payload contract, checked after every stage of either kind:
//! - every field present before the call is still present
//! - `recovery_log` keeps its earlier entries, in order

use crate::config::MeshConfig;
use crate::dispatch::registry::{StageHandler, StageRegistry};
use crate::error::{MeshError, RouteError};
use crate::observability::metrics::{StageOutcome, metrics};
use crate::protocol::messages::{Envelope, ErrorMessage, Payload, TicketStatus};
use crate::protocol::stages::StageId;
use crate::routing::RouteMutator;
use crate::routing::plan::RoutePlan;
use crate::signals::Signals;
use crate::stages::ContentStage;
use crate::stages::aggregator::resolve_status;
use crate::{stage_span, ticket_span};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, error, info, warn};

/// One stage invocation in a ticket's traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HopRecord {
    pub stage: StageId,
    pub cursor_before: usize,
    pub cursor_after: usize,
}

/// Result of dispatching one ticket
#[derive(Debug, Clone, Serialize)]
pub struct TicketOutcome {
    pub ticket_id: String,
    pub status: TicketStatus,
    /// Final envelope, or the envelope as it was before the failing hop
    pub envelope: Envelope,
    pub hops: Vec<HopRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<StageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorMessage>,
}

impl TicketOutcome {
    pub fn is_failed(&self) -> bool {
        self.status == TicketStatus::Failed
    }

    /// Stages in the order they were invoked
    pub fn visited(&self) -> Vec<StageId> {
        self.hops.iter().map(|hop| hop.stage).collect()
    }

    /// `final_response` written by the aggregator, if it ran
    pub fn final_response(&self) -> Option<&Value> {
        self.envelope.payload.get("final_response")
    }

    fn failed(
        envelope: Envelope,
        hops: Vec<HopRecord>,
        failed_stage: Option<StageId>,
        error: &MeshError,
    ) -> Self {
        let ticket_id = envelope.ticket_id();
        Self {
            error: Some(error.to_error_message(&ticket_id)),
            ticket_id,
            status: TicketStatus::Failed,
            envelope,
            hops,
            failed_stage,
        }
    }
}

/// Status of a ticket that completed its route
fn completed_status(envelope: &Envelope) -> TicketStatus {
    envelope
        .payload
        .get("final_response")
        .and_then(|response| response.get("status"))
        .and_then(|status| serde_json::from_value(status.clone()).ok())
        .unwrap_or_else(|| {
            resolve_status(&envelope.payload, &Signals::from_payload(&envelope.payload))
        })
}

/// Verify a mutator left the executed prefix alone and advanced exactly once
pub fn check_contract(
    stage: StageId,
    before: &RoutePlan,
    after: &RoutePlan,
) -> Result<(), RouteError> {
    if !before.prefix_preserved_by(after) {
        return Err(RouteError::contract_violation(
            stage,
            format!(
                "rewrote executed stages: {:?} became {:?}",
                before.stages(),
                after.stages()
            ),
        ));
    }

    let expected = before.cursor() + 1;
    let moved_once = after.cursor() == expected;
    let saturated = after.cursor() == before.cursor() && after.is_last();
    if !(moved_once || saturated) {
        return Err(RouteError::contract_violation(
            stage,
            format!(
                "moved cursor from {} to {} (expected {expected})",
                before.cursor(),
                after.cursor()
            ),
        ));
    }
    Ok(())
}

/// Verify a stage only appended or overwrote payload fields
pub fn check_payload(stage: StageId, before: &Payload, after: &Payload) -> Result<(), RouteError> {
    let dropped: Vec<&str> = before
        .as_map()
        .keys()
        .filter(|key| !after.contains_key(key))
        .map(String::as_str)
        .collect();
    if !dropped.is_empty() {
        return Err(RouteError::contract_violation(
            stage,
            format!("removed payload fields {dropped:?}"),
        ));
    }

    if let Some(earlier) = before.get("recovery_log").and_then(Value::as_array) {
        let kept = after
            .get("recovery_log")
            .and_then(Value::as_array)
            .is_some_and(|log| log.starts_with(earlier));
        if !kept {
            return Err(RouteError::contract_violation(
                stage,
                "rewrote earlier recovery_log entries",
            ));
        }
    }
    Ok(())
}

/// True when a mutator changed the stages scheduled after its own position
fn suffix_changed(before: &RoutePlan, after: &RoutePlan) -> bool {
    let stages = after.stages();
    stages.get(before.cursor() + 1..) != Some(before.pending())
}

/// A failed hop keeps the envelope as it was before the call
type HopResult = Result<Envelope, (Box<Envelope>, MeshError)>;

/// Executes envelopes against a stage registry
///
/// Cloning is cheap; clones share the registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<StageRegistry>,
    max_hops: u32,
}

impl Dispatcher {
    pub fn new(registry: StageRegistry, max_hops: u32) -> Self {
        Self {
            registry: Arc::new(registry),
            max_hops,
        }
    }

    /// Standard registry with the configured thresholds and hop ceiling
    pub fn from_config(config: &MeshConfig) -> Self {
        Self::new(StageRegistry::standard(config), config.dispatch.max_hops)
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn max_hops(&self) -> u32 {
        self.max_hops
    }

    /// Run one ticket to completion or to its first structural error
    pub async fn dispatch(&self, envelope: Envelope) -> TicketOutcome {
        let span = ticket_span!(ticket_id = %envelope.ticket_id());
        self.traverse(envelope).instrument(span).await
    }

    /// Run many tickets concurrently, one tokio task each
    ///
    /// Outcomes are returned in input order.
    pub async fn dispatch_all(&self, envelopes: Vec<Envelope>) -> Vec<TicketOutcome> {
        let handles: Vec<_> = envelopes
            .into_iter()
            .map(|envelope| {
                let dispatcher = self.clone();
                let fallback = envelope.clone();
                let handle = tokio::spawn(async move { dispatcher.dispatch(envelope).await });
                (fallback, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (envelope, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    let err = MeshError::internal_error(format!("dispatch task failed: {join_error}"));
                    error!(ticket_id = %envelope.ticket_id(), error = %err, "Ticket task aborted");
                    TicketOutcome::failed(envelope, Vec::new(), None, &err)
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn traverse(&self, mut envelope: Envelope) -> TicketOutcome {
        let started = Instant::now();
        let mut hops: Vec<HopRecord> = Vec::new();
        metrics().ticket_received();
        info!(
            route = ?envelope.route.stages(),
            cursor = envelope.route.cursor(),
            "Dispatching ticket"
        );

        loop {
            let stage = envelope.route.current();
            let taken = hops.len() as u32;
            if taken >= self.max_hops {
                let err = MeshError::hop_limit_exceeded(taken, self.max_hops);
                error!(hops = taken, max_hops = self.max_hops, "Hop ceiling reached, aborting ticket");
                metrics().ticket_failed(started.elapsed());
                return TicketOutcome::failed(envelope, hops, Some(stage), &err);
            }

            let Some(handler) = self.registry.get(stage).cloned() else {
                let err = MeshError::StageNotRegistered(stage);
                error!(stage = %stage, "No handler registered for stage");
                metrics().ticket_failed(started.elapsed());
                return TicketOutcome::failed(envelope, hops, Some(stage), &err);
            };

            let cursor_before = envelope.route.cursor();
            let was_last = envelope.route.is_last();
            let span = stage_span!(stage = %stage, kind = handler.kind(), cursor = cursor_before);
            let result = match handler {
                StageHandler::Content(content) => {
                    Self::run_content(content.as_ref(), envelope).instrument(span).await
                }
                StageHandler::Mutator(mutator) => {
                    Self::run_mutator(mutator.as_ref(), envelope).instrument(span).await
                }
            };

            envelope = match result {
                Ok(next) => next,
                Err((before, err)) => {
                    error!(stage = %stage, error = %err, "Stage failed, aborting ticket");
                    metrics().ticket_failed(started.elapsed());
                    return TicketOutcome::failed(*before, hops, Some(stage), &err);
                }
            };

            let cursor_after = envelope.route.cursor();
            hops.push(HopRecord {
                stage,
                cursor_before,
                cursor_after,
            });
            metrics().hop();

            if was_last && cursor_after == cursor_before {
                let status = completed_status(&envelope);
                let duration = started.elapsed();
                metrics().ticket_finished(status, duration);
                info!(
                    status = status.as_str(),
                    hops = hops.len(),
                    duration_ms = duration.as_millis() as u64,
                    "Ticket completed"
                );
                return TicketOutcome {
                    ticket_id: envelope.ticket_id(),
                    status,
                    envelope,
                    hops,
                    failed_stage: None,
                    error: None,
                };
            }
        }
    }

    /// Transform the payload, substituting the fallback for recoverable
    /// failures, then advance the cursor
    async fn run_content(stage: &dyn ContentStage, mut envelope: Envelope) -> HopResult {
        let id = stage.id();
        let started = Instant::now();

        match stage.transform(&envelope.payload).await {
            Ok(payload) => {
                if let Err(err) = check_payload(id, &envelope.payload, &payload) {
                    metrics().contract_violation();
                    metrics().stage_invoked(id, started.elapsed(), StageOutcome::Failed);
                    return Err((Box::new(envelope), err.into()));
                }
                metrics().stage_invoked(id, started.elapsed(), StageOutcome::Ok);
                envelope.payload = payload;
            }
            Err(failure) if failure.is_fatal() => {
                metrics().stage_invoked(id, started.elapsed(), StageOutcome::Failed);
                let err = MeshError::stage_failed(id, failure.to_string());
                return Err((Box::new(envelope), err));
            }
            Err(failure) => {
                warn!(stage = %id, error = %failure, "Stage failed, applying fallback");
                let payload = stage.fallback(envelope.payload.clone(), &failure);
                if let Err(err) = check_payload(id, &envelope.payload, &payload) {
                    metrics().contract_violation();
                    metrics().stage_invoked(id, started.elapsed(), StageOutcome::Failed);
                    return Err((Box::new(envelope), err.into()));
                }
                metrics().stage_invoked(id, started.elapsed(), StageOutcome::Fallback);
                envelope.payload = payload;
            }
        }

        if id == StageId::ResponseRefiner {
            metrics().refinement();
        }
        envelope.route.advance();
        Ok(envelope)
    }

    /// Let the mutator rewrite the route, then enforce its contract
    async fn run_mutator(mutator: &dyn RouteMutator, envelope: Envelope) -> HopResult {
        let id = mutator.id();
        let started = Instant::now();
        let before = envelope.clone();

        let outcome = mutator
            .process(envelope)
            .await
            .and_then(|after| {
                check_contract(id, &before.route, &after.route)?;
                check_payload(id, &before.payload, &after.payload)?;
                Ok(after)
            });

        match outcome {
            Ok(after) => {
                metrics().stage_invoked(id, started.elapsed(), StageOutcome::Ok);
                if suffix_changed(&before.route, &after.route) {
                    metrics().route_mutated();
                    debug!(stage = %id, route = ?after.route.stages(), "Route rewritten");
                }
                Ok(after)
            }
            Err(err) => {
                if matches!(err, RouteError::ContractViolation { .. }) {
                    metrics().contract_violation();
                }
                metrics().stage_invoked(id, started.elapsed(), StageOutcome::Failed);
                Err((Box::new(before), err.into()))
            }
        }
    }
}
