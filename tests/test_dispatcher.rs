//! Dispatcher integration tests
//!
//! Exercise full traversals through the standard registry and through
//! registries with scripted, failing and misbehaving stages.


use meshroute::dispatch::{Dispatcher, StageRegistry};
use meshroute::protocol::{Envelope, ErrorCode, Payload, StageId, TicketStatus};
use meshroute::testing::{
    FailingStage, ForgetfulStage, RogueMutator, ScriptedStage, StubbornRefiner, Violation,
};
use serde_json::json;
use std::time::{Duration, Instant};
use test_helpers::{envelope, scripted_registry, test_config, ticket};

use StageId::{
    ContextRetriever, DecisionRouter, EscalationRouter, GuardrailValidator, IntentClassifier,
    KnowledgeRetriever, ResponseAggregator, ResponseGenerator, ResponseRefiner, ResponseValidator,
    SentimentAnalyzer, TicketIngester,
};

fn error_code(outcome: &meshroute::TicketOutcome) -> ErrorCode {
    outcome.error.as_ref().expect("failed outcome carries an error").error.code
}

#[tokio::test]
async fn test_billing_ticket_resolves_through_standard_mesh() {
    let config = test_config();
    let dispatcher = Dispatcher::from_config(&config);
    let env = envelope(
        ticket(
            "T-billing",
            "Could you send me the invoice for my billing charge on order #12345",
        ),
        &[
            TicketIngester,
            SentimentAnalyzer,
            IntentClassifier,
            DecisionRouter,
            KnowledgeRetriever,
            ResponseGenerator,
            ResponseValidator,
            GuardrailValidator,
            ResponseAggregator,
        ],
        0,
    );

    let outcome = dispatcher.dispatch(env).await;

    assert!(!outcome.is_failed(), "unexpected failure: {:?}", outcome.error);
    assert_eq!(outcome.ticket_id, "T-billing");

    let visited = outcome.visited();
    assert_eq!(
        visited[..4],
        [TicketIngester, SentimentAnalyzer, IntentClassifier, DecisionRouter]
    );
    assert_eq!(visited[visited.len() - 2..], [GuardrailValidator, ResponseAggregator]);

    let payload = &outcome.envelope.payload;
    assert_eq!(payload.get("intent").unwrap()["intent"], "billing_inquiry");
    let decisions = payload.get("routing_decisions").unwrap().as_array().unwrap();
    assert!(decisions.contains(&json!("priority_processing")));
    assert!(outcome.final_response().is_some());

    // Every hop moved the cursor forward except the final one
    for hop in &outcome.hops[..outcome.hops.len() - 1] {
        assert_eq!(hop.cursor_after, hop.cursor_before + 1);
    }
}

#[tokio::test]
async fn test_legal_threat_escalates() {
    let config = test_config();
    let dispatcher = Dispatcher::from_config(&config);
    let payload = ticket(
        "T-legal",
        "This is unacceptable! I need this fixed immediately, I will contact my lawyer today.",
    );
    let env = Envelope::for_ticket(payload, &config.dispatch.initial_stages().unwrap()).unwrap();

    let outcome = dispatcher.dispatch(env).await;

    assert_eq!(outcome.status, TicketStatus::Escalated);
    let visited = outcome.visited();
    assert_eq!(
        visited[visited.len() - 3..],
        [DecisionRouter, EscalationRouter, ResponseAggregator]
    );
    let log = outcome.envelope.payload.get("recovery_log").unwrap();
    assert_eq!(log.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_refinement_budget_bounds_the_loop() {
    let mut config = test_config();
    config.quality.max_refinement_attempts = 2;

    let refiner = StubbornRefiner::new();
    let mut registry = scripted_registry(&config);
    registry
        .register_content(
            ScriptedStage::new(ResponseGenerator).writes("response", json!({"text": "Ok."})),
        )
        .register_content(refiner.clone());
    let dispatcher = Dispatcher::new(registry, config.dispatch.max_hops);

    let env = envelope(
        Payload::new().with("ticket_id", "T-refine"),
        &[ResponseGenerator, ResponseValidator, ResponseAggregator],
        0,
    );
    let outcome = dispatcher.dispatch(env).await;

    assert_eq!(
        outcome.visited(),
        vec![
            ResponseGenerator,
            ResponseValidator,
            ResponseRefiner,
            ResponseValidator,
            ResponseRefiner,
            ResponseValidator,
            EscalationRouter,
            ResponseAggregator,
        ]
    );
    assert_eq!(refiner.refinements(), 2);
    assert_eq!(outcome.status, TicketStatus::Escalated);

    let reasons = outcome.envelope.payload.get("escalation_reasons").unwrap();
    assert!(reasons.as_array().unwrap().contains(&json!("low_quality_response")));
    assert_eq!(outcome.envelope.payload.get_u64("refinement_attempts"), Some(2));
}

#[tokio::test]
async fn test_hop_ceiling_fails_ticket() {
    let config = test_config();
    let dispatcher = Dispatcher::new(scripted_registry(&config), 3);
    let env = envelope(
        Payload::new().with("ticket_id", "T-hops"),
        &[
            TicketIngester,
            SentimentAnalyzer,
            IntentClassifier,
            KnowledgeRetriever,
            ResponseAggregator,
        ],
        0,
    );

    let outcome = dispatcher.dispatch(env).await;

    assert!(outcome.is_failed());
    assert_eq!(error_code(&outcome), ErrorCode::HopLimitExceeded);
    assert_eq!(outcome.hops.len(), 3);
    assert_eq!(outcome.failed_stage, Some(KnowledgeRetriever));
}

#[tokio::test]
async fn test_unregistered_stage_fails_ticket() {
    let config = test_config();
    let mut registry = scripted_registry(&config);
    registry.unregister(ContextRetriever);
    let dispatcher = Dispatcher::new(registry, config.dispatch.max_hops);

    let env = envelope(
        Payload::new().with("ticket_id", "T-missing"),
        &[TicketIngester, ContextRetriever, ResponseAggregator],
        0,
    );
    let outcome = dispatcher.dispatch(env).await;

    assert_eq!(error_code(&outcome), ErrorCode::StageUnavailable);
    assert_eq!(outcome.failed_stage, Some(ContextRetriever));
    assert_eq!(outcome.envelope.route.cursor(), 1);
}

async fn dispatch_with_rogue(violation: Violation) -> meshroute::TicketOutcome {
    let config = test_config();
    let mut registry = scripted_registry(&config);
    registry.register_mutator(RogueMutator::new(DecisionRouter, violation));
    let dispatcher = Dispatcher::new(registry, config.dispatch.max_hops);

    let env = envelope(
        Payload::new().with("ticket_id", "T-rogue"),
        &[TicketIngester, IntentClassifier, DecisionRouter, ResponseGenerator, ResponseAggregator],
        0,
    );
    dispatcher.dispatch(env).await
}

#[tokio::test]
async fn test_contract_violations_fail_ticket() {
    for violation in [Violation::RewritePrefix, Violation::Stall, Violation::SkipAhead] {
        let outcome = dispatch_with_rogue(violation).await;

        assert!(outcome.is_failed(), "{violation:?} should fail the ticket");
        assert_eq!(error_code(&outcome), ErrorCode::ContractViolation, "{violation:?}");
        assert_eq!(outcome.failed_stage, Some(DecisionRouter));
        // Envelope is reported as it was before the offending call
        assert_eq!(outcome.envelope.route.cursor(), 2);
        assert_eq!(outcome.envelope.route.current(), DecisionRouter);
        assert_eq!(outcome.envelope.route.executed(), &[TicketIngester, IntentClassifier]);
    }
}

#[tokio::test]
async fn test_mutator_error_fails_ticket() {
    let outcome = dispatch_with_rogue(Violation::Fail).await;

    assert_eq!(error_code(&outcome), ErrorCode::InvalidRoute);
    assert_eq!(outcome.visited(), vec![TicketIngester, IntentClassifier]);
}

#[tokio::test]
async fn test_mutator_may_stay_put_on_last_stage() {
    let config = test_config();
    let mut registry = scripted_registry(&config);
    registry.register_mutator(RogueMutator::new(DecisionRouter, Violation::Stall));
    let dispatcher = Dispatcher::new(registry, config.dispatch.max_hops);

    let env = envelope(
        Payload::new().with("ticket_id", "T-last"),
        &[IntentClassifier, DecisionRouter],
        0,
    );
    let outcome = dispatcher.dispatch(env).await;

    assert!(!outcome.is_failed(), "unexpected failure: {:?}", outcome.error);
    assert_eq!(outcome.visited(), vec![IntentClassifier, DecisionRouter]);
    let last = outcome.hops.last().unwrap();
    assert_eq!(last.cursor_before, last.cursor_after);
}

#[tokio::test]
async fn test_stage_dropping_payload_fields_fails_ticket() {
    let config = test_config();
    let mut registry = scripted_registry(&config);
    registry.register_content(ForgetfulStage::new(ResponseGenerator));
    let dispatcher = Dispatcher::new(registry, config.dispatch.max_hops);

    let payload = Payload::new()
        .with("ticket_id", "T-forget")
        .with("recovery_log", json!([{"actor": "escalation-router", "reasons": ["manual_review"]}]));
    let env = envelope(
        payload,
        &[KnowledgeRetriever, ResponseGenerator, ResponseAggregator],
        0,
    );
    let outcome = dispatcher.dispatch(env).await;

    assert_eq!(error_code(&outcome), ErrorCode::ContractViolation);
    assert_eq!(outcome.failed_stage, Some(ResponseGenerator));
    assert_eq!(outcome.ticket_id, "T-forget");
    // Envelope is reported as it was before the offending call
    let log = outcome.envelope.payload.get("recovery_log").unwrap();
    assert_eq!(log.as_array().unwrap().len(), 1);
    assert_eq!(outcome.envelope.route.current(), ResponseGenerator);
}

#[tokio::test]
async fn test_recoverable_failure_applies_fallback() {
    let config = test_config();
    let failing = FailingStage::recoverable(KnowledgeRetriever);
    let mut registry = scripted_registry(&config);
    registry.register_content(failing.clone());
    let dispatcher = Dispatcher::new(registry, config.dispatch.max_hops);

    let env = envelope(
        Payload::new().with("ticket_id", "T-fallback"),
        &[KnowledgeRetriever, ResponseGenerator, ResponseAggregator],
        0,
    );
    let outcome = dispatcher.dispatch(env).await;

    assert!(!outcome.is_failed());
    assert_eq!(failing.attempts(), 1);
    assert_eq!(
        outcome.visited(),
        vec![KnowledgeRetriever, ResponseGenerator, ResponseAggregator]
    );
    let errors = outcome.envelope.payload.get("stage_errors").unwrap();
    assert_eq!(errors[0]["stage"], "knowledge-retriever");
}

#[tokio::test]
async fn test_fatal_failure_stops_ticket() {
    let config = test_config();
    let mut registry = scripted_registry(&config);
    registry.register_content(FailingStage::fatal(ResponseGenerator));
    let dispatcher = Dispatcher::new(registry, config.dispatch.max_hops);

    let env = envelope(
        Payload::new().with("ticket_id", "T-fatal"),
        &[KnowledgeRetriever, ResponseGenerator, ResponseAggregator],
        0,
    );
    let outcome = dispatcher.dispatch(env).await;

    assert_eq!(error_code(&outcome), ErrorCode::StageFailed);
    assert_eq!(outcome.failed_stage, Some(ResponseGenerator));
    assert_eq!(outcome.visited(), vec![KnowledgeRetriever]);
}

#[tokio::test]
async fn test_dispatch_all_preserves_input_order() {
    let config = test_config();
    let mut registry = scripted_registry(&config);
    registry.register_content(
        ScriptedStage::new(KnowledgeRetriever).with_delay(Duration::from_millis(50)),
    );
    let dispatcher = Dispatcher::new(registry, config.dispatch.max_hops);

    let envelopes: Vec<Envelope> = (0..8)
        .map(|i| {
            envelope(
                Payload::new().with("ticket_id", format!("T-{i}")),
                &[KnowledgeRetriever, ResponseAggregator],
                0,
            )
        })
        .collect();

    let started = Instant::now();
    let outcomes = dispatcher.dispatch_all(envelopes).await;

    let ids: Vec<_> = outcomes.iter().map(|o| o.ticket_id.clone()).collect();
    let expected: Vec<_> = (0..8).map(|i| format!("T-{i}")).collect();
    assert_eq!(ids, expected);
    assert!(outcomes.iter().all(|o| !o.is_failed()));
    // Tickets run concurrently, not back to back
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_standard_registry_serves_every_stage() {
    let registry = StageRegistry::standard(&test_config());
    for stage in StageId::ALL {
        assert!(registry.contains(stage), "{stage} missing");
    }
}
