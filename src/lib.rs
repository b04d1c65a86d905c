//! meshroute - dynamic route mutation for support tickets
//!
//! Each ticket travels through a mesh of stages carrying its own route plan:
//! an ordered list of stage ids plus a cursor. Content stages enrich the
//! payload. Route mutators (the decision router, the escalation router and
//! the quality gate) read the accumulated signals and rewrite the part of the
//! route that has not run yet, so a ticket's path is decided one hop at a time
//! by the data it carries.
//!
//! # Overview
//!
//! - [`routing::RoutePlan`]: route with an immutable executed prefix
//! - [`routing::DecisionRouter`], [`routing::EscalationRouter`],
//!   [`routing::QualityGate`]: the route mutators
//! - [`stages`]: reference content stages (sentiment, intent, replies, ...)
//! - [`dispatch::Dispatcher`]: runs envelopes and enforces the mutator contract
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use meshroute::config::MeshConfig;
//! use meshroute::dispatch::Dispatcher;
//! use meshroute::protocol::{Envelope, Payload};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MeshConfig::default();
//! let payload = Payload::new()
//!     .with("customer_email", "user@example.com")
//!     .with("message", "My order #12345 never arrived and I need it urgently");
//! let envelope = Envelope::for_ticket(payload, &config.dispatch.initial_stages()?)?;
//!
//! let outcome = Dispatcher::from_config(&config).dispatch(envelope).await;
//! println!("{} -> {:?}", outcome.ticket_id, outcome.status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod routing;
pub mod signals;
pub mod stages;
pub mod testing;

pub use config::MeshConfig;
pub use dispatch::{Dispatcher, StageRegistry, TicketOutcome};
pub use error::{MeshError, MeshResult, RouteError};
pub use protocol::{Envelope, Payload, StageId, TicketStatus};
pub use routing::{RouteMutator, RoutePlan};
