// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Carshare-Bot: chat bot for a car-sharing B2B portal
//!
//! Users reach their company's balance, rides and invoices through a chat;
//! a background notifier tells them when the balance or ride history changes.

pub mod bot;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use bot::ChatTransport;
use config::Config;
use db::{CredentialStore, DocumentStore};
use services::{CompanyService, PortalClient};
use std::sync::Arc;

/// Shared application state, built once at startup.
pub struct AppContext {
    pub config: Config,
    pub store: CredentialStore,
    pub companies: CompanyService,
    pub transport: Arc<dyn ChatTransport>,
}

impl AppContext {
    pub fn new(
        config: Config,
        documents: Arc<dyn DocumentStore>,
        portal: Arc<dyn PortalClient>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        let store = CredentialStore::new(documents, &config.environment, config.io_timeout)
            .with_cipher(config.credentials_cipher.clone());
        let companies = CompanyService::new(portal, config.io_timeout);
        Self {
            config,
            store,
            companies,
            transport,
        }
    }
}
