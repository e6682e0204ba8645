//! Unified error types for the Analytics Reporting MCP Server.

use reqwest::StatusCode;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Authentication-related errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Token request failed with status {status}: {body}")]
    TokenRequestFailed { status: StatusCode, body: String },

    #[error("Token parse error: {0}")]
    TokenParse(String),

    #[error("No token available")]
    NoToken,

    #[error("Failed to create HTTP client: {0}")]
    HttpClientInit(String),
}

/// API request/response errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("Reporting API error [{code}]: {message}")]
    Remote {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Failed to create HTTP client: {0}")]
    HttpClientInit(String),
}

/// Errors raised while building a report request or turning its pages into a table.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Malformed field specification, unknown field kind or unrecognized date expression.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Input of a kind that cannot express a date.
    #[error("Invalid type: {0}")]
    InvalidType(String),

    /// The server answered with pages that contradict themselves.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Cannot decode {value:?} in column '{column}' as {expected}")]
    Decode {
        column: String,
        value: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ReportError {
    /// True for errors detected before any request left the process.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidValue(_) | Self::InvalidType(_))
    }
}
