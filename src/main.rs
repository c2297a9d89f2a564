// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Carshare-Bot server
//!
//! Serves the Telegram webhook and runs the change notifier alongside it.

use carshare_bot::{
    bot::telegram::TelegramTransport,
    config::{Config, StoreBackend},
    db::{DocumentStore, FirestoreDb, MemoryStore},
    services::{ChangeNotifier, HttpPortalClient},
    AppContext,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        environment = %config.environment,
        store = ?config.store_backend,
        "Starting Carshare-Bot"
    );

    if config.credentials_cipher.is_none() {
        tracing::warn!("CREDENTIALS_KEY not set; portal passwords are stored unencrypted (debug build)");
    }

    let documents: Arc<dyn DocumentStore> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let portal = Arc::new(HttpPortalClient::new(
        config.portal_base_url.clone(),
        config.io_timeout,
    )?);
    let transport = Arc::new(TelegramTransport::new(
        &config.telegram_token,
        config.io_timeout,
    )?);

    let port = config.port;
    let ctx = Arc::new(AppContext::new(config, documents, portal, transport));

    // Independent background task; talks to request handling only via the store
    ChangeNotifier::new(&ctx).spawn();

    let app = carshare_bot::routes::create_router(ctx);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("carshare_bot=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
