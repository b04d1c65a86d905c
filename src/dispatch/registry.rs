//! Stage registry
//!
//! Maps each [`StageId`] to the handler the dispatcher invokes when the cursor
//! reaches it. A stage is either a content transform or a route mutator.

use crate::config::MeshConfig;
use crate::protocol::stages::StageId;
use crate::routing::{DecisionRouter, EscalationRouter, QualityGate, RouteMutator};
use crate::stages::{
    ContentStage, ContextRetriever, ExecutionCoordinator, GuardrailValidator, IntentClassifier,
    KnowledgeRetriever, ResponseAggregator, ResponseGenerator, ResponseRefiner, SentimentAnalyzer,
    TicketIngester,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Handler registered for one stage
#[derive(Clone)]
pub enum StageHandler {
    /// Enriches the payload; the dispatcher advances the cursor
    Content(Arc<dyn ContentStage>),
    /// Rewrites the suffix and advances the cursor itself
    Mutator(Arc<dyn RouteMutator>),
}

impl StageHandler {
    pub fn kind(&self) -> &'static str {
        match self {
            StageHandler::Content(_) => "content",
            StageHandler::Mutator(_) => "mutator",
        }
    }
}

impl std::fmt::Debug for StageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageHandler::Content(stage) => write!(f, "Content({})", stage.id()),
            StageHandler::Mutator(mutator) => write!(f, "Mutator({})", mutator.id()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    handlers: HashMap<StageId, StageHandler>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stage in the vocabulary with its reference implementation
    ///
    /// Router thresholds and the refinement budget come from `config`.
    pub fn standard(config: &MeshConfig) -> Self {
        let mut registry = Self::new();

        registry.register_content(TicketIngester::new());
        registry.register_content(SentimentAnalyzer::new());
        registry.register_content(IntentClassifier::new());
        registry.register_content(ContextRetriever::new());
        registry.register_content(KnowledgeRetriever::new());
        registry.register_content(ResponseGenerator::new());
        registry.register_content(ResponseRefiner::new());
        registry.register_content(GuardrailValidator::new());
        registry.register_content(ExecutionCoordinator::new());
        registry.register_content(ResponseAggregator::new());

        registry.register_mutator(DecisionRouter::new(config.routing.clone()));
        registry.register_mutator(EscalationRouter::new(config.routing.clone()));
        registry.register_mutator(QualityGate::new(config.quality.clone()));

        registry
    }

    /// Register a content stage under its own id, replacing any previous
    /// handler for that id
    pub fn register_content<S: ContentStage + 'static>(&mut self, stage: S) -> &mut Self {
        self.handlers
            .insert(stage.id(), StageHandler::Content(Arc::new(stage)));
        self
    }

    /// Register a route mutator under its own id, replacing any previous
    /// handler for that id
    pub fn register_mutator<M: RouteMutator + 'static>(&mut self, mutator: M) -> &mut Self {
        self.handlers
            .insert(mutator.id(), StageHandler::Mutator(Arc::new(mutator)));
        self
    }

    /// Remove the handler for `stage`
    pub fn unregister(&mut self, stage: StageId) -> Option<StageHandler> {
        self.handlers.remove(&stage)
    }

    pub fn get(&self, stage: StageId) -> Option<&StageHandler> {
        self.handlers.get(&stage)
    }

    pub fn contains(&self, stage: StageId) -> bool {
        self.handlers.contains_key(&stage)
    }

    /// Registered stage ids in canonical order
    pub fn list_stages(&self) -> Vec<StageId> {
        let mut stages: Vec<_> = self.handlers.keys().copied().collect();
        stages.sort();
        stages
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
