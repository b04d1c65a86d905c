//! Route mutator trait
//!
//! Content stages only enrich the payload; the dispatcher moves the cursor for
//! them. A route mutator instead owns the next routing step: it reads the
//! accumulated signals, rewrites the unexecuted suffix of the route and
//! advances the cursor itself.
//!
//! ```text
//! Dispatcher -> RouteMutator::process(envelope) -> envelope'
//!                 rewrites route.pending, calls route.advance() once
//! ```
//!
//! # Example
//!
//! ```rust
//! use meshroute::protocol::{Envelope, Payload, StageId};
//! use meshroute::routing::{DecisionRouter, RouteMutator, RoutePlan};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let payload = Payload::new()
//!     .with("sentiment", json!({"label": "neutral", "urgency": "critical"}));
//! let route = RoutePlan::new(
//!     vec![StageId::DecisionRouter, StageId::ResponseGenerator, StageId::ResponseAggregator],
//!     0,
//! )?;
//!
//! let routed = DecisionRouter::default().process(Envelope::new(payload, route)).await?;
//! assert_eq!(routed.route.current(), StageId::EscalationRouter);
//! # Ok::<(), meshroute::error::RouteError>(())
//! # }).unwrap();
//! ```

use crate::error::RouteError;
use crate::protocol::messages::Envelope;
use crate::protocol::stages::StageId;

/// Stage that rewrites the route plan
///
/// ## Contract
///
/// - Never edit stages at or before the cursor
/// - Leave the cursor in range
/// - Advance exactly once (possibly after truncating the suffix)
///
/// The dispatcher checks the contract after every call and aborts the ticket
/// with [`RouteError::ContractViolation`] when it is broken.
///
/// Business outcomes (low confidence, failed guardrail, poor reply) are
/// expressed as routing changes. `Err` is reserved for structural problems.
#[async_trait::async_trait]
pub trait RouteMutator: Send + Sync {
    /// Identifier this mutator is registered under
    fn id(&self) -> StageId;

    /// Rewrite the route for one envelope and advance past this stage
    async fn process(&self, envelope: Envelope) -> Result<Envelope, RouteError>;
}

/// Reject envelopes whose cursor is not on the mutator's own stage
pub(crate) fn ensure_at_cursor(envelope: &Envelope, id: StageId) -> Result<(), RouteError> {
    if envelope.route.current() != id {
        return Err(RouteError::contract_violation(
            id,
            format!(
                "invoked while the cursor is on {} (position {})",
                envelope.route.current(),
                envelope.route.cursor()
            ),
        ));
    }
    Ok(())
}
