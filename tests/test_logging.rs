//! Tests for logging configuration and format parsing
//!
//! Tests the pure functions in the logging module that handle
//! log format and level parsing, plus the dispatch span macros.

use meshroute::observability::logging::{LogFormat, init_logging, parse_level};
use meshroute::{stage_span, ticket_span};
use tracing::Level;

#[test]
fn test_log_format_parse_json() {
    assert!(matches!(LogFormat::parse("json"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("JSON"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("Json"), LogFormat::Json));
}

#[test]
fn test_log_format_parse_pretty() {
    assert!(matches!(LogFormat::parse("pretty"), LogFormat::Pretty));
    assert!(matches!(LogFormat::parse("PRETTY"), LogFormat::Pretty));
}

#[test]
fn test_log_format_parse_compact() {
    assert!(matches!(LogFormat::parse("compact"), LogFormat::Compact));
    assert!(matches!(LogFormat::parse("Compact"), LogFormat::Compact));
}

#[test]
fn test_log_format_parse_invalid_defaults_to_json() {
    // Unknown formats fall back to machine-readable output
    for input in ["invalid", "", "xml", "yaml", "123"] {
        assert!(matches!(LogFormat::parse(input), LogFormat::Json), "{input}");
    }
}

#[test]
fn test_parse_level_is_case_insensitive() {
    assert_eq!(parse_level("debug"), Level::DEBUG);
    assert_eq!(parse_level("Warn"), Level::WARN);
    assert_eq!(parse_level("TRACE"), Level::TRACE);
    assert_eq!(parse_level("error"), Level::ERROR);
}

#[test]
fn test_parse_level_defaults_to_info() {
    assert_eq!(parse_level(""), Level::INFO);
    assert_eq!(parse_level("loud"), Level::INFO);
}

#[test]
fn test_spans_usable_after_init() {
    init_logging(Level::DEBUG, LogFormat::Compact, true);

    let ticket = ticket_span!(ticket_id = "T-log", route_len = 9);
    let _entered = ticket.enter();
    let stage = stage_span!(stage = "escalation-router", kind = "mutator", cursor = 4);
    stage.in_scope(|| tracing::info!(reasons = ?["manual_review"], "Ticket escalated"));
}
