// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use carshare_bot::bot::{ChatTransport, Menu, OutboundMessage};
use carshare_bot::config::Config;
use carshare_bot::db::{FirestoreDb, MemoryStore};
use carshare_bot::error::AppError;
use carshare_bot::models::{Company, Ride, User};
use carshare_bot::routes::create_router;
use carshare_bot::services::{CompanyInfo, FileBlob, InvoiceRef, PortalClient, TokenClaim};
use carshare_bot::AppContext;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

// ═══════════════════════════════════════════════════════════════════════════
// FAKE PORTAL
// ═══════════════════════════════════════════════════════════════════════════

/// One company as the fake portal knows it.
#[derive(Clone)]
pub struct PortalCompany {
    pub login: String,
    pub password: String,
    pub info: CompanyInfo,
    pub employees: Vec<String>,
    /// Most recent first
    pub rides: Vec<Ride>,
    pub invoices: Vec<f64>,
}

#[derive(Default)]
struct PortalState {
    companies: HashMap<i64, PortalCompany>,
    /// Live token -> company id
    tokens: HashMap<String, i64>,
    failing: HashSet<i64>,
    /// Companies whose roster endpoint alone fails
    failing_roster: HashSet<i64>,
    token_ttl_secs: i64,
    issued: u64,
}

/// Scripted in-process portal.
pub struct FakePortal {
    state: Mutex<PortalState>,
    logins: AtomicUsize,
}

#[allow(dead_code)]
impl FakePortal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PortalState {
                token_ttl_secs: 3600,
                ..Default::default()
            }),
            logins: AtomicUsize::new(0),
        }
    }

    pub fn add_company(&self, id: i64, login: &str, password: &str, name: &str, balance: f64) {
        self.state.lock().unwrap().companies.insert(
            id,
            PortalCompany {
                login: login.to_string(),
                password: password.to_string(),
                info: CompanyInfo {
                    id,
                    name: name.to_string(),
                    balance,
                    can_create_invoice: true,
                    min_invoice_amount: 3000.0,
                },
                employees: Vec::new(),
                rides: Vec::new(),
                invoices: Vec::new(),
            },
        );
    }

    fn with_company<T>(&self, id: i64, f: impl FnOnce(&mut PortalCompany) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        let company = state.companies.get_mut(&id).expect("unknown fake company");
        f(company)
    }

    pub fn set_balance(&self, id: i64, balance: f64) {
        self.with_company(id, |c| c.info.balance = balance);
    }

    pub fn set_employees(&self, id: i64, phones: &[&str]) {
        self.with_company(id, |c| {
            c.employees = phones.iter().map(|p| p.to_string()).collect()
        });
    }

    pub fn set_invoice_limits(&self, id: i64, allowed: bool, min_amount: f64) {
        self.with_company(id, |c| {
            c.info.can_create_invoice = allowed;
            c.info.min_invoice_amount = min_amount;
        });
    }

    /// Add a new most-recent ride.
    pub fn push_ride(&self, id: i64, rent_id: i64) {
        self.with_company(id, |c| c.rides.insert(0, ride(rent_id)));
    }

    pub fn invoices(&self, id: i64) -> Vec<f64> {
        self.with_company(id, |c| c.invoices.clone())
    }

    /// Make every call for this company fail with a network error.
    pub fn fail_company(&self, id: i64) {
        self.state.lock().unwrap().failing.insert(id);
    }

    /// Make only the employee roster endpoint fail for this company.
    pub fn fail_roster(&self, id: i64) {
        self.state.lock().unwrap().failing_roster.insert(id);
    }

    /// Forget every issued token, as if the portal revoked them.
    pub fn revoke_tokens(&self) {
        self.state.lock().unwrap().tokens.clear();
    }

    /// Lifetime of tokens issued from now on (may be negative).
    pub fn set_token_ttl(&self, secs: i64) {
        self.state.lock().unwrap().token_ttl_secs = secs;
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    /// Validate a bearer token for a company-scoped call.
    fn authorize(&self, token: &str, company_id: i64) -> Result<PortalCompany, AppError> {
        let state = self.state.lock().unwrap();
        if state.failing.contains(&company_id) {
            return Err(AppError::Network("connection reset".to_string()));
        }
        match state.tokens.get(token) {
            Some(owner) if *owner == company_id => {}
            _ => return Err(AppError::Auth(AppError::PORTAL_TOKEN_REJECTED.to_string())),
        }
        state
            .companies
            .get(&company_id)
            .cloned()
            .ok_or_else(|| AppError::PortalApi("company not found".to_string()))
    }
}

#[async_trait]
impl PortalClient for FakePortal {
    async fn login(&self, login: &str, password: &str) -> Result<TokenClaim, AppError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();

        let company_id = state
            .companies
            .iter()
            .find(|(_, c)| c.login == login && c.password == password)
            .map(|(id, _)| *id)
            .ok_or_else(|| AppError::Auth("wrong login or password".to_string()))?;
        if state.failing.contains(&company_id) {
            return Err(AppError::Network("connection reset".to_string()));
        }

        state.issued += 1;
        let token = format!("token-{}-{}", company_id, state.issued);
        state.tokens.insert(token.clone(), company_id);

        Ok(TokenClaim {
            token,
            expires_at: Utc::now().timestamp() + state.token_ttl_secs,
            company_id,
            first_name: "Anna".to_string(),
            last_name: "Smirnova".to_string(),
        })
    }

    async fn fetch_company_info(&self, token: &str, company_id: i64) -> Result<CompanyInfo, AppError> {
        Ok(self.authorize(token, company_id)?.info)
    }

    async fn fetch_rides(
        &self,
        token: &str,
        company_id: i64,
        limit: u32,
        page: u32,
    ) -> Result<Vec<Ride>, AppError> {
        let company = self.authorize(token, company_id)?;
        let skip = (page.saturating_sub(1) * limit) as usize;
        Ok(company
            .rides
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .collect())
    }

    async fn fetch_employees(&self, token: &str, company_id: i64) -> Result<Vec<String>, AppError> {
        let company = self.authorize(token, company_id)?;
        if self.state.lock().unwrap().failing_roster.contains(&company_id) {
            return Err(AppError::PortalApi("employees endpoint unavailable".to_string()));
        }
        Ok(company.employees)
    }

    async fn create_invoice(
        &self,
        token: &str,
        company_id: i64,
        amount: f64,
    ) -> Result<InvoiceRef, AppError> {
        self.authorize(token, company_id)?;
        let number = self.with_company(company_id, |c| {
            c.invoices.push(amount);
            c.invoices.len() as i64
        });
        Ok(InvoiceRef(number))
    }

    async fn fetch_latest_file(
        &self,
        token: &str,
        company_id: i64,
        kind: &str,
    ) -> Result<FileBlob, AppError> {
        let company = self.authorize(token, company_id)?;
        let amount = company
            .invoices
            .last()
            .ok_or_else(|| AppError::NotFound(format!("No {} documents this month", kind)))?;
        Ok(FileBlob {
            file_name: format!("{}-{}.pdf", kind, company.invoices.len()),
            mime: "application/pdf".to_string(),
            data: format!("%PDF {}", amount).into_bytes(),
        })
    }
}

/// A ride with fixed details.
#[allow(dead_code)]
pub fn ride(rent_id: i64) -> Ride {
    Ride {
        rent_id,
        start_time: Utc.with_ymd_and_hms(2024, 3, 5, 7, 30, 0).unwrap(),
        end_time: Utc.with_ymd_and_hms(2024, 3, 5, 8, 5, 0).unwrap(),
        duration_minutes: 35,
        cost: 412.5,
        currency: "rub".to_string(),
        car: "Kia Rio".to_string(),
        plate: "a123bc777".to_string(),
        client_name: "Ivan Petrov".to_string(),
        distance: 14,
        start_address: "Tverskaya 1".to_string(),
        end_address: "Arbat 10".to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FAKE TRANSPORT
// ═══════════════════════════════════════════════════════════════════════════

/// A message the bot sent.
#[derive(Debug, Clone)]
pub struct Sent {
    pub chat_id: i64,
    pub message: OutboundMessage,
    pub menu: Menu,
}

impl Sent {
    #[allow(dead_code)]
    pub fn text(&self) -> &str {
        match &self.message {
            OutboundMessage::Text(text) => text,
            OutboundMessage::Document(_) => "",
        }
    }
}

/// Records everything sent; sends to chats marked unreachable fail.
#[derive(Default)]
pub struct FakeTransport {
    sent: Mutex<Vec<Sent>>,
    deleted: Mutex<Vec<(i64, i64)>>,
    unreachable: Mutex<HashSet<i64>>,
}

#[allow(dead_code)]
impl FakeTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.chat_id == chat_id)
            .collect()
    }

    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.sent_to(chat_id)
            .iter()
            .map(|s| s.text().to_string())
            .collect()
    }

    pub fn deleted(&self) -> Vec<(i64, i64)> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn set_unreachable(&self, chat_id: i64, unreachable: bool) {
        let mut set = self.unreachable.lock().unwrap();
        if unreachable {
            set.insert(chat_id);
        } else {
            set.remove(&chat_id);
        }
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn send(&self, chat_id: i64, message: OutboundMessage, menu: Menu) -> Result<(), AppError> {
        if self.unreachable.lock().unwrap().contains(&chat_id) {
            return Err(AppError::Network("bot was blocked by the user".to_string()));
        }
        self.sent.lock().unwrap().push(Sent {
            chat_id,
            message,
            menu,
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), AppError> {
        self.deleted.lock().unwrap().push((chat_id, message_id));
        Ok(())
    }

    async fn answer_callback(&self, _callback_id: &str) -> Result<(), AppError> {
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TEST ENVIRONMENT
// ═══════════════════════════════════════════════════════════════════════════

/// Application context over fakes and an in-memory store.
pub struct TestEnv {
    pub ctx: Arc<AppContext>,
    pub portal: Arc<FakePortal>,
    pub transport: Arc<FakeTransport>,
    pub documents: MemoryStore,
}

#[allow(dead_code)]
impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let portal = Arc::new(FakePortal::new());
        let transport = Arc::new(FakeTransport::default());
        let documents = MemoryStore::new();
        let ctx = Arc::new(AppContext::new(
            config,
            Arc::new(documents.clone()),
            portal.clone(),
            transport.clone(),
        ));
        Self {
            ctx,
            portal,
            transport,
            documents,
        }
    }

    /// Register a company on the portal and in the store (no session yet).
    pub async fn seed_company(&self, id: i64, name: &str, balance: f64) -> Company {
        let login = format!("corp{}", id);
        self.portal.add_company(id, &login, "pw", name, balance);
        let mut company = Company::new(id, login, "pw");
        company.name = name.to_string();
        company.balance = balance;
        self.ctx.store.save_company(&company).await.unwrap();
        company
    }

    pub async fn seed_user(&self, id: i64, phone: &str, company_id: i64, admin: bool) -> User {
        let mut user = User::new(id, phone);
        user.company_id = company_id;
        user.admin = admin;
        self.ctx.store.save_user(&user).await.unwrap();
        user
    }

    pub async fn user(&self, id: i64) -> User {
        self.ctx.store.load_user(id).await.unwrap()
    }

    pub async fn company(&self, id: i64) -> Company {
        self.ctx.store.load_company(id).await.unwrap()
    }

    pub fn router(&self) -> axum::Router {
        create_router(self.ctx.clone())
    }
}
