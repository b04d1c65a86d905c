//! Reply quality gate
//!
//! Registered as `response-validator`. Scores the generated reply and either
//! lets it through, schedules a refinement round, or gives up and escalates
//! once the refinement budget is spent. The budget bounds the
//! refine/validate loop, so a refiner that never improves the reply cannot
//! keep a ticket cycling.

use crate::config::QualitySection;
use crate::error::RouteError;
use crate::protocol::messages::Envelope;
use crate::protocol::stages::StageId;
use crate::routing::mutator::{RouteMutator, ensure_at_cursor};
use crate::signals::reply_text;
use tracing::{debug, info, warn};

const AFFIRMING_PHRASES: &[&str] = &["thank you", "help", "assist", "understand", "provide"];

/// Heuristic reply score in [0, 1]
///
/// Only the "too short" check ignores surrounding whitespace; the length
/// bands above it count the reply as written.
pub fn score_reply(reply: &str) -> f64 {
    if reply.trim().chars().count() < 10 {
        return 0.3;
    }
    let length = reply.chars().count();
    if length < 50 {
        return 0.5;
    }

    let lowered = reply.to_lowercase();
    let affirming = AFFIRMING_PHRASES.iter().any(|p| lowered.contains(p));
    match (affirming, length > 100) {
        (true, true) => 0.85,
        (true, false) => 0.75,
        (false, _) => 0.65,
    }
}

/// Outcome of one validation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Refine,
    Exhausted,
}

#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    settings: QualitySection,
}

impl QualityGate {
    pub fn new(settings: QualitySection) -> Self {
        Self { settings }
    }

    pub fn verdict(&self, score: f64, attempts: u32) -> Verdict {
        if score >= self.settings.threshold {
            Verdict::Passed
        } else if attempts < self.settings.max_refinement_attempts {
            Verdict::Refine
        } else {
            Verdict::Exhausted
        }
    }
}

#[async_trait::async_trait]
impl RouteMutator for QualityGate {
    fn id(&self) -> StageId {
        StageId::ResponseValidator
    }

    async fn process(&self, mut envelope: Envelope) -> Result<Envelope, RouteError> {
        ensure_at_cursor(&envelope, self.id())?;

        let score = score_reply(reply_text(&envelope.payload).as_deref().unwrap_or(""));
        let attempts = envelope
            .payload
            .get_u64("refinement_attempts")
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(0);
        let verdict = self.verdict(score, attempts);

        envelope.payload.set("judge_score", score);
        envelope
            .payload
            .set("validation_passed", verdict == Verdict::Passed);

        match verdict {
            Verdict::Passed => {
                debug!(ticket_id = %envelope.ticket_id(), score, "Reply passed quality gate");
            }
            Verdict::Refine => {
                envelope.payload.set("refinement_attempts", attempts + 1);
                // Validator first so the refiner lands in front of it. A
                // refiner scheduled further down does not count: the next
                // stage must be the refiner.
                envelope.route.append_if_absent(StageId::ResponseValidator);
                envelope.route.ensure_within(StageId::ResponseRefiner, 1);
                info!(
                    ticket_id = %envelope.ticket_id(),
                    score,
                    attempt = attempts + 1,
                    "Reply below threshold, scheduling refinement"
                );
            }
            Verdict::Exhausted => {
                envelope.payload.set("refinement_exhausted", true);
                envelope.route.truncate_and_replace_tail([
                    StageId::EscalationRouter,
                    StageId::ResponseAggregator,
                ]);
                warn!(
                    ticket_id = %envelope.ticket_id(),
                    score,
                    attempts,
                    "Refinement budget exhausted, escalating"
                );
            }
        }

        envelope.route.advance();
        Ok(envelope)
    }
}
