//! Error types for route mutation and dispatch
//!
//! Two classes of failure exist. Structural errors ([`RouteError`], and the
//! dispatch-level variants of [`MeshError`]) abort a ticket's traversal and
//! are surfaced to the caller. Business outcomes such as low confidence or a
//! failed guardrail are never errors; they are encoded in the route plan.

use crate::protocol::messages::{ErrorCode, ErrorDetails, ErrorMessage};
use crate::protocol::stages::{StageId, UnknownStage};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Structural route errors: malformed plans and broken mutator contracts
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    #[error("Invalid route: {message}")]
    InvalidRoute { message: String },

    #[error("Invalid route: {0}")]
    UnknownStage(#[from] UnknownStage),

    #[error("Route contract violated by {stage}: {message}")]
    ContractViolation { stage: StageId, message: String },
}

impl RouteError {
    /// Create invalid route error
    pub fn invalid_route<S: Into<String>>(message: S) -> Self {
        Self::InvalidRoute {
            message: message.into(),
        }
    }

    /// Create contract violation error
    pub fn contract_violation<S: Into<String>>(stage: StageId, message: S) -> Self {
        Self::ContractViolation {
            stage,
            message: message.into(),
        }
    }
}

/// Main error type for mesh operations
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Route error: {0}")]
    Route(#[from] RouteError),

    #[error("No handler registered for stage {0}")]
    StageNotRegistered(StageId),

    #[error("Stage {stage} failed: {message}")]
    StageFailed { stage: StageId, message: String },

    #[error("Hop limit exceeded: {hops} hops taken, max {max}")]
    HopLimitExceeded { hops: u32, max: u32 },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MeshError {
    /// Convert into the wire error reported for a failed ticket
    pub fn to_error_message(&self, ticket_id: &str) -> ErrorMessage {
        let code = match self {
            MeshError::Route(RouteError::ContractViolation { .. }) => ErrorCode::ContractViolation,
            MeshError::Route(_) => ErrorCode::InvalidRoute,
            MeshError::StageNotRegistered(_) => ErrorCode::StageUnavailable,
            MeshError::StageFailed { .. } => ErrorCode::StageFailed,
            MeshError::HopLimitExceeded { .. } => ErrorCode::HopLimitExceeded,
            MeshError::InvalidInput { .. } | MeshError::Serialization(_) => ErrorCode::InvalidInput,
            MeshError::InternalError { .. } | MeshError::ConfigError(_) => ErrorCode::InternalError,
        };

        ErrorMessage {
            error: ErrorDetails {
                code,
                message: sanitize_error_message(&self.to_string()),
            },
            ticket_id: ticket_id.to_string(),
        }
    }

    /// Create stage failure error
    pub fn stage_failed<S: Into<String>>(stage: StageId, message: S) -> Self {
        Self::StageFailed {
            stage,
            message: message.into(),
        }
    }

    /// Create hop limit error
    pub fn hop_limit_exceeded(hops: u32, max: u32) -> Self {
        Self::HopLimitExceeded { hops, max }
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Strip credentials and sensitive paths from messages that leave the mesh
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = SECRET_PATTERN.replace_all(message, "${1}=***");
    let mut sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_ERROR_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for mesh operations
pub type MeshResult<T> = Result<T, MeshError>;
