// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types shared by the bot, the notifier and the HTTP routes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type.
///
/// Variants fall into four categories that decide what the end user sees:
/// `NotFound` starts onboarding, `Auth` and `PortalApi` are shown verbatim,
/// everything else is surfaced as a generic message while the caller logs
/// the details.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Portal API error: {0}")]
    PortalApi(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Generic text for failures whose details must stay in the logs.
    pub const GENERIC_MESSAGE: &'static str =
        "Something went wrong on our side. Please try again in a minute.";

    /// Message carried by `Auth` when the portal answers 401 to a bearer token.
    pub const PORTAL_TOKEN_REJECTED: &'static str = "portal rejected the session token";

    /// True when the portal refused a token we believed valid.
    pub fn is_token_rejected(&self) -> bool {
        matches!(self, AppError::Auth(msg) if msg == Self::PORTAL_TOKEN_REJECTED)
    }

    /// True for network/store/timeout failures (the I/O category).
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Network(_)
                | AppError::Timeout(_)
                | AppError::Internal(_)
        )
    }

    /// Text that may be shown to the chat user for this error.
    ///
    /// Pure; logging the underlying failure is up to the caller.
    pub fn user_message(&self) -> String {
        match self {
            AppError::NotFound(_) => {
                "We haven't met yet. Press Start and share your phone number.".to_string()
            }
            AppError::Auth(msg) => format!("Authorization failed: {}", msg),
            AppError::PortalApi(msg) => format!("The portal refused the request: {}", msg),
            AppError::BadRequest(msg) => msg.clone(),
            _ => Self::GENERIC_MESSAGE.to_string(),
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::Auth(_) => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::PortalApi(msg) => {
                (StatusCode::BAD_GATEWAY, "portal_error", Some(msg.clone()))
            }
            AppError::Timeout(msg) => {
                tracing::error!(error = %msg, "Timeout");
                (StatusCode::GATEWAY_TIMEOUT, "timeout", None)
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Network(msg) => {
                tracing::error!(error = %msg, "Network error");
                (StatusCode::BAD_GATEWAY, "network_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AppError>;
