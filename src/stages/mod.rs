//! Content stages
//!
//! A content stage reads the payload and returns an enriched copy. It never
//! sees the route; the dispatcher advances the cursor after it runs.
//!
//! Stages report failure explicitly through [`StageFailure`]. Recoverable
//! failures are replaced by the stage's documented neutral fallback so the
//! ticket keeps moving; fatal failures stop the ticket.
//!
//! The implementations in this module are simple keyword and
//! lookup-table transforms, enough for a ticket to traverse the full mesh.

use crate::protocol::messages::Payload;
use crate::protocol::stages::StageId;
use serde_json::json;
use thiserror::Error;

pub mod aggregator;
pub mod context;
pub mod execution;
pub mod guardrail;
pub mod ingest;
pub mod intent;
pub mod knowledge;
pub mod response;
pub mod sentiment;

pub use aggregator::ResponseAggregator;
pub use context::ContextRetriever;
pub use execution::ExecutionCoordinator;
pub use guardrail::GuardrailValidator;
pub use ingest::TicketIngester;
pub use intent::IntentClassifier;
pub use knowledge::KnowledgeRetriever;
pub use response::{ResponseGenerator, ResponseRefiner};
pub use sentiment::SentimentAnalyzer;

/// Failure reported by a content stage
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageFailure {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Lookup failed: {0}")]
    Lookup(String),

    /// Not recoverable by a fallback; the ticket is stopped
    #[error("Fatal stage error: {0}")]
    Fatal(String),
}

impl StageFailure {
    pub fn missing_field<S: Into<String>>(field: S) -> Self {
        Self::MissingField(field.into())
    }

    pub fn invalid_field<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StageFailure::Fatal(_))
    }
}

/// Payload-mode transform
#[async_trait::async_trait]
pub trait ContentStage: Send + Sync {
    /// Identifier this stage is registered under
    fn id(&self) -> StageId;

    /// Return the enriched payload
    async fn transform(&self, payload: &Payload) -> Result<Payload, StageFailure>;

    /// Neutral result used when `transform` fails recoverably
    ///
    /// The default only records the failure under `stage_errors`.
    fn fallback(&self, mut payload: Payload, failure: &StageFailure) -> Payload {
        annotate_failure(&mut payload, self.id(), failure);
        payload
    }
}

/// Append `{stage, error}` to the payload's `stage_errors` list
pub fn annotate_failure(payload: &mut Payload, stage: StageId, failure: &StageFailure) {
    payload.append_to(
        "stage_errors",
        json!({
            "stage": stage.as_str(),
            "error": failure.to_string(),
        }),
    );
}

/// Customer message text, from `customer_message` or `message`
pub(crate) fn message_text(payload: &Payload) -> Option<&str> {
    payload
        .get_str("customer_message")
        .or_else(|| payload.get_str("message"))
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
