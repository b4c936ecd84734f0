//! Common error types for the relay agent

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::provider::ProviderError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Instance metadata error: {0}")]
    Metadata(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid backend target: {0}")]
    InvalidTarget(String),

    #[error("Reconcile trigger queue is full")]
    TriggerBusy,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response format for the admin surface
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            AgentError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AgentError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
            AgentError::Json(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
            AgentError::HttpClient(_) => (StatusCode::BAD_GATEWAY, "metadata_error"),
            AgentError::Metadata(_) => (StatusCode::BAD_GATEWAY, "metadata_error"),
            AgentError::Provider(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
            AgentError::InvalidTarget(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            AgentError::TriggerBusy => (StatusCode::TOO_MANY_REQUESTS, "trigger_busy"),
            AgentError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: error_type.to_string(),
            },
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AgentError>;
