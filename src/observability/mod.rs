//! Observability for ticket dispatch
//!
//! Structured logging with per-ticket and per-stage spans, plus a global
//! metrics collector fed by the dispatcher.

pub mod logging;
pub mod metrics;

pub use logging::{LogFormat, init_default_logging, init_logging, parse_level};
pub use metrics::{MetricsCollector, MetricsSnapshot, StageOutcome, metrics};

// Span macros for structured logging
pub use logging::{stage_span, ticket_span};
