//! Route plans and the stages that rewrite them
//!
//! ## Route plan (plan.rs)
//!
//! [`RoutePlan`] holds the ordered stage list and the dispatch cursor. Its
//! editing primitives only reach the unexecuted suffix.
//!
//! ## Route mutators
//!
//! Stages implementing [`RouteMutator`] rewrite the suffix from the signals
//! on the payload and advance the cursor themselves:
//!
//! - [`DecisionRouter`] (`decision-router`): signal-driven rerouting
//! - [`EscalationRouter`] (`escalation-router`): hand-off to human review
//! - [`QualityGate`] (`response-validator`): bounded refine loop

pub mod decision_router;
pub mod escalation_router;
pub mod mutator;
pub mod plan;
pub mod quality_gate;

pub use decision_router::{DecisionRouter, RoutingRule};
pub use escalation_router::EscalationRouter;
pub use mutator::RouteMutator;
pub use plan::{RoutePlan, WireRoute};
pub use quality_gate::{QualityGate, Verdict, score_reply};
