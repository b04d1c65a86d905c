//! Mock stages for testing
//!
//! Provides scripted and failing content stages, a stage that discards the
//! payload, a refiner that never improves a reply, and a route mutator that
//! breaks its contract on purpose, so the dispatcher can be exercised without
//! the reference stage implementations.

use crate::error::RouteError;
use crate::protocol::messages::{Envelope, Payload};
use crate::protocol::stages::StageId;
use crate::routing::RouteMutator;
use crate::stages::{ContentStage, StageFailure};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Content stage that writes fixed fields and records every payload it sees
#[derive(Debug, Clone)]
pub struct ScriptedStage {
    id: StageId,
    writes: Vec<(String, Value)>,
    delay: Option<Duration>,
    pub seen: Arc<Mutex<Vec<Payload>>>,
}

impl ScriptedStage {
    pub fn new(id: StageId) -> Self {
        Self {
            id,
            writes: Vec::new(),
            delay: None,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set `key` to `value` on every invocation
    pub fn writes(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.writes.push((key.into(), value.into()));
        self
    }

    /// Sleep before returning
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn invocations(&self) -> usize {
        self.seen.lock().await.len()
    }
}

#[async_trait]
impl ContentStage for ScriptedStage {
    fn id(&self) -> StageId {
        self.id
    }

    async fn transform(&self, payload: &Payload) -> Result<Payload, StageFailure> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.seen.lock().await.push(payload.clone());

        let mut out = payload.clone();
        for (key, value) in &self.writes {
            out.set(key, value.clone());
        }
        out.append_to("visited", self.id.as_str());
        Ok(out)
    }
}

/// Content stage whose transform always fails
#[derive(Debug, Clone)]
pub struct FailingStage {
    id: StageId,
    failure: StageFailure,
    pub attempts: Arc<AtomicUsize>,
}

impl FailingStage {
    /// Fails with a lookup error; the dispatcher applies the fallback
    pub fn recoverable(id: StageId) -> Self {
        Self::with_failure(id, StageFailure::Lookup("backing store unavailable".to_string()))
    }

    /// Fails fatally; the dispatcher stops the ticket
    pub fn fatal(id: StageId) -> Self {
        Self::with_failure(id, StageFailure::Fatal("stage crashed".to_string()))
    }

    pub fn with_failure(id: StageId, failure: StageFailure) -> Self {
        Self {
            id,
            failure,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentStage for FailingStage {
    fn id(&self) -> StageId {
        self.id
    }

    async fn transform(&self, _payload: &Payload) -> Result<Payload, StageFailure> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(self.failure.clone())
    }
}

/// Refiner that replaces the reply with one the quality gate always rejects
#[derive(Debug, Clone, Default)]
pub struct StubbornRefiner {
    pub refinements: Arc<AtomicUsize>,
}

impl StubbornRefiner {
    pub const REPLY: &'static str = "Ok.";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn refinements(&self) -> usize {
        self.refinements.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentStage for StubbornRefiner {
    fn id(&self) -> StageId {
        StageId::ResponseRefiner
    }

    async fn transform(&self, payload: &Payload) -> Result<Payload, StageFailure> {
        self.refinements.fetch_add(1, Ordering::SeqCst);
        Ok(payload.clone().with("response", json!({"text": Self::REPLY})))
    }
}

/// Content stage that returns a fresh payload instead of enriching the one
/// it was given
#[derive(Debug, Clone)]
pub struct ForgetfulStage {
    id: StageId,
}

impl ForgetfulStage {
    pub fn new(id: StageId) -> Self {
        Self { id }
    }
}

#[async_trait]
impl ContentStage for ForgetfulStage {
    fn id(&self) -> StageId {
        self.id
    }

    async fn transform(&self, _payload: &Payload) -> Result<Payload, StageFailure> {
        Ok(Payload::new().with("response", "fresh"))
    }
}

/// Way in which [`RogueMutator`] breaks the route mutator contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Replace the first executed stage
    RewritePrefix,
    /// Return without advancing
    Stall,
    /// Advance twice
    SkipAhead,
    /// Report a structural error
    Fail,
}

/// Route mutator registered under any id that misbehaves on every call
#[derive(Debug, Clone)]
pub struct RogueMutator {
    id: StageId,
    violation: Violation,
}

impl RogueMutator {
    pub fn new(id: StageId, violation: Violation) -> Self {
        Self { id, violation }
    }
}

#[async_trait]
impl RouteMutator for RogueMutator {
    fn id(&self) -> StageId {
        self.id
    }

    async fn process(&self, mut envelope: Envelope) -> Result<Envelope, RouteError> {
        match self.violation {
            Violation::RewritePrefix => {
                let mut stages = envelope.route.stages();
                stages[0] = if stages[0] == StageId::TicketIngester {
                    StageId::SentimentAnalyzer
                } else {
                    StageId::TicketIngester
                };
                let cursor = envelope.route.cursor() + 1;
                envelope.route = crate::routing::RoutePlan::new(stages, cursor)?;
            }
            Violation::Stall => {}
            Violation::SkipAhead => {
                envelope.route.advance();
                envelope.route.advance();
            }
            Violation::Fail => {
                return Err(RouteError::invalid_route("rogue mutator refused the route"));
            }
        }
        Ok(envelope)
    }
}
