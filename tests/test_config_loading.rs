//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.

use meshroute::config::{ConfigError, MeshConfig};
use meshroute::protocol::StageId;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[mesh]
id = "support-eu"
description = "European support mesh"

[routing]
low_confidence_threshold = 0.5
escalation_intensity_threshold = 0.75
complex_order_count = 3

[quality]
threshold = 0.8
max_refinement_attempts = 1

[dispatch]
max_hops = 16
initial_route = ["ingest", "sentiment-analyzer", "classify", "decision-router", "response-aggregator"]
"#,
    );

    let config = MeshConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.mesh.id, "support-eu");
    assert_eq!(config.mesh.description, "European support mesh");
    assert_eq!(config.routing.low_confidence_threshold, 0.5);
    assert_eq!(config.routing.escalation_intensity_threshold, 0.75);
    assert_eq!(config.routing.complex_order_count, 3);
    assert_eq!(config.quality.threshold, 0.8);
    assert_eq!(config.quality.max_refinement_attempts, 1);
    assert_eq!(config.dispatch.max_hops, 16);
    assert_eq!(
        config.dispatch.initial_stages().unwrap(),
        vec![
            StageId::TicketIngester,
            StageId::SentimentAnalyzer,
            StageId::IntentClassifier,
            StageId::DecisionRouter,
            StageId::ResponseAggregator,
        ]
    );
}

#[test]
fn test_empty_file_yields_defaults() {
    let temp_file = write_config("");

    let config = MeshConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config, MeshConfig::default());
    assert_eq!(config.mesh.id, "support-mesh");
    assert_eq!(config.dispatch.max_hops, 32);
    assert_eq!(config.quality.max_refinement_attempts, 2);
}

#[test]
fn test_partial_sections_keep_remaining_defaults() {
    let temp_file = write_config(
        r#"
[quality]
threshold = 0.9
"#,
    );

    let config = MeshConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.quality.threshold, 0.9);
    assert_eq!(config.quality.max_refinement_attempts, 2);
    assert_eq!(config.routing.low_confidence_threshold, 0.6);
}

#[test]
fn test_threshold_out_of_range_rejected() {
    let temp_file = write_config(
        r#"
[routing]
low_confidence_threshold = 1.5
"#,
    );

    let result = MeshConfig::load_from_file(temp_file.path());

    match result {
        Err(ConfigError::InvalidConfig(msg)) => {
            assert!(msg.contains("routing.low_confidence_threshold"), "{msg}");
        }
        other => panic!("Expected InvalidConfig, got {other:?}"),
    }
}

#[test]
fn test_zero_hop_ceiling_rejected() {
    let temp_file = write_config(
        r#"
[dispatch]
max_hops = 0
"#,
    );

    let result = MeshConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_unknown_stage_in_initial_route_rejected() {
    let temp_file = write_config(
        r#"
[dispatch]
initial_route = ["ticket-ingester", "telepathy-engine"]
"#,
    );

    let result = MeshConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::UnknownStage(_))));
}

#[test]
fn test_empty_initial_route_rejected() {
    let result = MeshConfig::from_toml_str(
        r#"
[dispatch]
initial_route = []
"#,
    );
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_invalid_mesh_id_rejected() {
    for bad_id in ["", "support mesh", "mesh/eu", "mesh#1"] {
        let result = MeshConfig::from_toml_str(&format!("[mesh]\nid = \"{bad_id}\"\n"));
        assert!(
            matches!(result, Err(ConfigError::InvalidMeshId(_))),
            "Mesh ID {bad_id:?} should be rejected"
        );
    }
}

#[test]
fn test_malformed_toml_rejected() {
    let temp_file = write_config("[mesh\nid = ");

    let result = MeshConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_missing_file_reports_read_error() {
    let result = MeshConfig::load_from_file(Path::new("/nonexistent/meshroute.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = MeshConfig::default();
    let rendered = toml::to_string_pretty(&config).unwrap();

    assert_eq!(MeshConfig::from_toml_str(&rendered).unwrap(), config);
}
