// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Telegram webhook authentication middleware.

use crate::AppContext;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Header Telegram echoes back with the secret set on `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Require the configured webhook secret on every update.
pub async fn require_webhook_secret(
    State(ctx): State<Arc<AppContext>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let presented = request
        .headers()
        .get(SECRET_TOKEN_HEADER)
        .map(|h| h.as_bytes())
        .unwrap_or_default();
    let expected = ctx.config.webhook_secret.as_bytes();

    let valid = !expected.is_empty() && bool::from(presented.ct_eq(expected));
    if !valid {
        tracing::warn!(
            header_present = !presented.is_empty(),
            "Blocked webhook request with invalid secret token"
        );
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}
