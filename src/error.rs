//! Error types for the data-access layer
//!
//! Errors are classified the way the list views react to them:
//! - Retryable: simulated network failures, non-OK responses, unreadable resources
//! - NotFound: update or conversion referencing an absent id
//! - Invalid: payloads that fail validation or do not parse

use thiserror::Error;

pub const FETCH_LEADS_FAILED: &str = "Failed to fetch leads";
pub const FETCH_OPPORTUNITIES_FAILED: &str = "Failed to fetch opportunities";
pub const SIMULATED_NETWORK_ERROR: &str = "Simulated network error";
pub const LEAD_NOT_FOUND: &str = "Lead not found";
pub const GENERIC_ERROR: &str = "An error occurred";

/// Error types for store operations
#[derive(Debug, Error)]
pub enum ApiError {
    // Retryable errors
    #[error("{0}")]
    Network(String),

    /// Non-OK response for a resource. The message is fixed per resource.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Resource unavailable: {0}")]
    Unavailable(String),

    /// Resource body is not the expected JSON. Re-reading may help.
    #[error("Failed to parse {resource}: {detail}")]
    Parse { resource: String, detail: String },

    // Non-retryable errors
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },
}

impl ApiError {
    pub fn simulated() -> Self {
        ApiError::Network(SIMULATED_NETWORK_ERROR.to_string())
    }

    pub fn lead_not_found() -> Self {
        ApiError::NotFound(LEAD_NOT_FOUND.to_string())
    }

    /// Returns true if re-issuing the request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_)
                | ApiError::Status { .. }
                | ApiError::Unavailable(_)
                | ApiError::Parse { .. }
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network(_)
            | ApiError::Status { .. }
            | ApiError::Unavailable(_)
            | ApiError::Parse { .. } => ErrorKind::Network,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Validation { .. } => ErrorKind::Invalid,
        }
    }

    /// Get a user-facing recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ApiError::Network(_) => "Check your connection and try again.",
            ApiError::Status { .. } => "The data service is unavailable. Try again.",
            ApiError::Unavailable(_) => "Check that the data files are reachable.",
            ApiError::NotFound(_) => "The record no longer exists. Refresh the list.",
            ApiError::Parse { .. } => "Check the data file format is correct.",
            ApiError::Validation { .. } => "Correct the highlighted field and save again.",
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Unavailable(err.to_string())
    }
}

/// Serializable error representation for views
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorState {
    pub message: String,
    pub kind: ErrorKind,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    NotFound,
    Invalid,
}

impl From<&ApiError> for ErrorState {
    fn from(err: &ApiError) -> Self {
        ErrorState {
            message: err.to_string(),
            kind: err.kind(),
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
