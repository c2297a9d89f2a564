// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Telegram webhook route.

use crate::bot::handle_event;
use crate::bot::telegram::Update;
use crate::middleware::require_webhook_secret;
use crate::AppContext;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    middleware,
    routing::post,
    Router,
};
use std::sync::Arc;

pub const WEBHOOK_PATH: &str = "/telegram/webhook";

/// Webhook routes, guarded by the secret token header.
pub fn routes(ctx: Arc<AppContext>) -> Router<Arc<AppContext>> {
    Router::new()
        .route(WEBHOOK_PATH, post(handle_update))
        .route_layer(middleware::from_fn_with_state(ctx, require_webhook_secret))
}

/// Accept an update and process it in the background.
///
/// Always answers 200 once authenticated: Telegram redelivers anything else,
/// and a malformed update will not get better on retry.
async fn handle_update(
    State(ctx): State<Arc<AppContext>>,
    Json(payload): Json<serde_json::Value>,
) -> StatusCode {
    let update: Update = match serde_json::from_value(payload) {
        Ok(update) => update,
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse Telegram update");
            return StatusCode::OK;
        }
    };

    let update_id = update.update_id;
    let Some(event) = update.into_event() else {
        tracing::debug!(update_id, "Ignoring update without a command");
        return StatusCode::OK;
    };

    tracing::info!(update_id, chat_id = event.chat_id, "Update received");
    tokio::spawn(async move {
        handle_event(&ctx, event).await;
    });

    StatusCode::OK
}
