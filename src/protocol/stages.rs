//! Stage identifier vocabulary
//!
//! Every stage in the mesh is named by a [`StageId`]. The wire form is the
//! lowercase, hyphenated name (safe for queue, process and service names);
//! unknown names are rejected rather than carried through as free strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Closed set of stages a ticket may visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageId {
    TicketIngester,
    SentimentAnalyzer,
    IntentClassifier,
    ContextRetriever,
    KnowledgeRetriever,
    DecisionRouter,
    ResponseGenerator,
    ResponseValidator,
    ResponseRefiner,
    GuardrailValidator,
    ExecutionCoordinator,
    EscalationRouter,
    ResponseAggregator,
}

/// Returned when a stage name is not part of the vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown stage identifier: '{0}'")]
pub struct UnknownStage(pub String);

impl StageId {
    /// Every stage, in canonical pipeline order
    pub const ALL: [StageId; 13] = [
        StageId::TicketIngester,
        StageId::SentimentAnalyzer,
        StageId::IntentClassifier,
        StageId::ContextRetriever,
        StageId::KnowledgeRetriever,
        StageId::DecisionRouter,
        StageId::ResponseGenerator,
        StageId::ResponseValidator,
        StageId::ResponseRefiner,
        StageId::GuardrailValidator,
        StageId::ExecutionCoordinator,
        StageId::EscalationRouter,
        StageId::ResponseAggregator,
    ];

    /// Wire name of the stage
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::TicketIngester => "ticket-ingester",
            StageId::SentimentAnalyzer => "sentiment-analyzer",
            StageId::IntentClassifier => "intent-classifier",
            StageId::ContextRetriever => "context-retriever",
            StageId::KnowledgeRetriever => "knowledge-retriever",
            StageId::DecisionRouter => "decision-router",
            StageId::ResponseGenerator => "response-generator",
            StageId::ResponseValidator => "response-validator",
            StageId::ResponseRefiner => "response-refiner",
            StageId::GuardrailValidator => "guardrail-validator",
            StageId::ExecutionCoordinator => "execution-coordinator",
            StageId::EscalationRouter => "escalation-router",
            StageId::ResponseAggregator => "response-aggregator",
        }
    }

    /// True for stages that rewrite the route plan themselves
    pub fn is_route_mutator(&self) -> bool {
        matches!(
            self,
            StageId::DecisionRouter | StageId::EscalationRouter | StageId::ResponseValidator
        )
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = UnknownStage;

    /// Parse a wire name. Underscored spellings and the short aliases
    /// `ingest` / `classify` used by older route templates are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "ingest" => return Ok(StageId::TicketIngester),
            "classify" => return Ok(StageId::IntentClassifier),
            _ => {}
        }
        StageId::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}
