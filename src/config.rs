//! Mesh configuration
//!
//! Loaded from TOML. Every section and field has a default, so an empty file
//! is a valid configuration:
//!
//! ```toml
//! [mesh]
//! id = "support-mesh"
//!
//! [routing]
//! low_confidence_threshold = 0.6
//!
//! [quality]
//! max_refinement_attempts = 2
//!
//! [dispatch]
//! max_hops = 32
//! initial_route = ["ticket-ingester", "sentiment-analyzer", "intent-classifier", "decision-router", "response-aggregator"]
//! ```

use crate::protocol::stages::{StageId, UnknownStage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Main mesh configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MeshConfig {
    #[serde(default)]
    pub mesh: MeshSection,
    #[serde(default)]
    pub routing: RoutingSection,
    #[serde(default)]
    pub quality: QualitySection,
    #[serde(default)]
    pub dispatch: DispatchSection,
}

/// Mesh identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeshSection {
    /// Mesh identifier (must match [a-zA-Z0-9._-]+)
    #[serde(default = "default_mesh_id")]
    pub id: String,
    #[serde(default)]
    pub description: String,
}

impl Default for MeshSection {
    fn default() -> Self {
        Self {
            id: default_mesh_id(),
            description: String::new(),
        }
    }
}

fn default_mesh_id() -> String {
    "support-mesh".to_string()
}

/// Thresholds used by the decision and escalation routers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingSection {
    /// Intent confidence below this is treated as low
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f64,
    /// Negative sentiment above this intensity escalates immediately
    #[serde(default = "default_escalation_intensity_threshold")]
    pub escalation_intensity_threshold: f64,
    /// More known orders than this makes a query complex
    #[serde(default = "default_complex_order_count")]
    pub complex_order_count: usize,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            low_confidence_threshold: default_low_confidence_threshold(),
            escalation_intensity_threshold: default_escalation_intensity_threshold(),
            complex_order_count: default_complex_order_count(),
        }
    }
}

fn default_low_confidence_threshold() -> f64 {
    0.6
}

fn default_escalation_intensity_threshold() -> f64 {
    0.8
}

fn default_complex_order_count() -> usize {
    5
}

/// Quality gate settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualitySection {
    /// Minimum reply score that passes without refinement
    #[serde(default = "default_quality_threshold")]
    pub threshold: f64,
    /// Refinement rounds before the ticket is escalated instead
    #[serde(default = "default_max_refinement_attempts")]
    pub max_refinement_attempts: u32,
}

impl Default for QualitySection {
    fn default() -> Self {
        Self {
            threshold: default_quality_threshold(),
            max_refinement_attempts: default_max_refinement_attempts(),
        }
    }
}

fn default_quality_threshold() -> f64 {
    0.7
}

fn default_max_refinement_attempts() -> u32 {
    2
}

/// Dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchSection {
    /// Per-ticket hop ceiling
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    /// Route assigned to tickets that arrive without one
    #[serde(default = "default_initial_route")]
    pub initial_route: Vec<String>,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            initial_route: default_initial_route(),
        }
    }
}

fn default_max_hops() -> u32 {
    32
}

fn default_initial_route() -> Vec<String> {
    [
        StageId::TicketIngester,
        StageId::SentimentAnalyzer,
        StageId::IntentClassifier,
        StageId::DecisionRouter,
        StageId::KnowledgeRetriever,
        StageId::ResponseGenerator,
        StageId::ResponseValidator,
        StageId::GuardrailValidator,
        StageId::ResponseAggregator,
    ]
    .iter()
    .map(|stage| stage.as_str().to_string())
    .collect()
}

impl DispatchSection {
    /// Parse the configured initial route into stage identifiers
    pub fn initial_stages(&self) -> Result<Vec<StageId>, ConfigError> {
        Ok(self
            .initial_route
            .iter()
            .map(|name| name.parse::<StageId>())
            .collect::<Result<Vec<_>, _>>()?)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid mesh ID format: {0}")]
    InvalidMeshId(String),
    #[error("Invalid stage in initial route: {0}")]
    UnknownStage(#[from] UnknownStage),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MeshConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: MeshConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and the initial route
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_mesh_id(&self.mesh.id)?;

        let unit_interval = [
            ("routing.low_confidence_threshold", self.routing.low_confidence_threshold),
            (
                "routing.escalation_intensity_threshold",
                self.routing.escalation_intensity_threshold,
            ),
            ("quality.threshold", self.quality.threshold),
        ];
        for (name, value) in unit_interval {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        if self.dispatch.max_hops == 0 {
            return Err(ConfigError::InvalidConfig(
                "dispatch.max_hops must be at least 1".to_string(),
            ));
        }

        if self.dispatch.initial_stages()?.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "dispatch.initial_route must name at least one stage".to_string(),
            ));
        }

        Ok(())
    }
}

/// Validate mesh ID format
fn validate_mesh_id(mesh_id: &str) -> Result<(), ConfigError> {
    let valid_chars = mesh_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if mesh_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidMeshId(format!(
            "Mesh ID '{mesh_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = MeshConfig::from_toml_str("").unwrap();
        assert_eq!(config, MeshConfig::default());
        assert_eq!(config.mesh.id, "support-mesh");
        assert_eq!(config.routing.low_confidence_threshold, 0.6);
        assert_eq!(config.routing.escalation_intensity_threshold, 0.8);
        assert_eq!(config.routing.complex_order_count, 5);
        assert_eq!(config.quality.threshold, 0.7);
        assert_eq!(config.quality.max_refinement_attempts, 2);
        assert_eq!(config.dispatch.max_hops, 32);
    }

    #[test]
    fn test_default_initial_route() {
        let stages = DispatchSection::default().initial_stages().unwrap();
        assert_eq!(stages.first(), Some(&StageId::TicketIngester));
        assert_eq!(stages.last(), Some(&StageId::ResponseAggregator));
        assert!(stages.contains(&StageId::DecisionRouter));
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[mesh]
id = "eu-support"
description = "European support tickets"

[routing]
low_confidence_threshold = 0.5
escalation_intensity_threshold = 0.9
complex_order_count = 3

[quality]
threshold = 0.8
max_refinement_attempts = 1

[dispatch]
max_hops = 16
initial_route = ["ingest", "classify", "decision-router", "response-aggregator"]
"#;

        let config = MeshConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.mesh.id, "eu-support");
        assert_eq!(config.routing.complex_order_count, 3);
        assert_eq!(config.quality.max_refinement_attempts, 1);
        assert_eq!(config.dispatch.max_hops, 16);
        assert_eq!(
            config.dispatch.initial_stages().unwrap(),
            vec![
                StageId::TicketIngester,
                StageId::IntentClassifier,
                StageId::DecisionRouter,
                StageId::ResponseAggregator
            ]
        );
    }

    #[test]
    fn test_invalid_mesh_id() {
        assert!(validate_mesh_id("invalid@mesh").is_err());
        assert!(validate_mesh_id("").is_err());
        assert!(validate_mesh_id("valid-mesh_123.test").is_ok());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let result = MeshConfig::from_toml_str("[routing]\nlow_confidence_threshold = 1.5\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));

        let result = MeshConfig::from_toml_str("[quality]\nthreshold = -0.1\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_hops_rejected() {
        let result = MeshConfig::from_toml_str("[dispatch]\nmax_hops = 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_initial_route_validation() {
        let result = MeshConfig::from_toml_str("[dispatch]\ninitial_route = []\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));

        let result = MeshConfig::from_toml_str("[dispatch]\ninitial_route = [\"oracle\"]\n");
        assert!(matches!(result, Err(ConfigError::UnknownStage(_))));
    }
}
