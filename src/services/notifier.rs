// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Periodic change notifications.
//!
//! Each tick:
//! 1. Refreshes every stored company from the portal into a snapshot
//! 2. Walks every stored user bound to a refreshed company
//! 3. For each watched signal, compares the company's current value with
//!    the user's watermark and notifies on difference
//! 4. Advances the watermark only after the message was delivered
//!
//! A failing company or user is logged and skipped; the tick always runs to
//! the end.

use crate::bot::transport::{ChatTransport, OutboundMessage};
use crate::bot::Menu;
use crate::db::CredentialStore;
use crate::error::AppError;
use crate::models::{Company, User};
use crate::services::company::CompanyService;
use crate::services::permissions::{self, Role};
use crate::time_utils::bounded;
use crate::AppContext;
use futures_util::{stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const MAX_CONCURRENT_REFRESHES: usize = 8;

/// Company state a user can be notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeSignal {
    /// Company balance
    Balance,
    /// Id of the most recent ride
    LastRide,
}

/// A value observed for a signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    Balance(f64),
    Ride(i64),
}

impl Observation {
    /// Balances compare at kopeck precision to ignore float noise.
    fn differs_from(self, other: Observation) -> bool {
        match (self, other) {
            (Observation::Balance(a), Observation::Balance(b)) => {
                (a * 100.0).round() != (b * 100.0).round()
            }
            (a, b) => a != b,
        }
    }
}

impl ChangeSignal {
    pub fn name(self) -> &'static str {
        match self {
            ChangeSignal::Balance => "balance",
            ChangeSignal::LastRide => "last_ride",
        }
    }

    /// Current value in the company snapshot; `None` when there is nothing
    /// to compare (no rides yet).
    pub fn observe(self, company: &Company) -> Option<Observation> {
        match self {
            ChangeSignal::Balance => Some(Observation::Balance(company.balance)),
            ChangeSignal::LastRide => company.latest_ride().map(|r| Observation::Ride(r.rent_id)),
        }
    }

    /// The user's watermark for this signal.
    pub fn last_seen(self, user: &User) -> Observation {
        match self {
            ChangeSignal::Balance => Observation::Balance(user.last_balance),
            ChangeSignal::LastRide => Observation::Ride(user.last_ride_id),
        }
    }

    /// Move the user's watermark to `observed`.
    pub fn advance(self, user: &mut User, observed: Observation) {
        match (self, observed) {
            (ChangeSignal::Balance, Observation::Balance(value)) => user.last_balance = value,
            (ChangeSignal::LastRide, Observation::Ride(id)) => user.last_ride_id = id,
            (signal, observed) => {
                tracing::error!(signal = signal.name(), ?observed, "Observation does not match signal");
            }
        }
    }

    /// True when the company moved past the user's watermark.
    pub fn changed(self, company: &Company, user: &User) -> Option<Observation> {
        self.observe(company)
            .filter(|observed| observed.differs_from(self.last_seen(user)))
    }

    /// Notification text for a change.
    pub fn message(self, company: &Company) -> String {
        match self {
            ChangeSignal::Balance => format!(
                "💸 The balance of {} has changed\nCurrent balance: {:.2} ₽",
                company.name, company.balance
            ),
            ChangeSignal::LastRide => match company.latest_ride() {
                Some(ride) => format!("🚗 New ride in {}\n{}", company.name, ride.summary()),
                None => format!("🚗 New ride in {}", company.name),
            },
        }
    }
}

/// Outcome counters of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub companies_refreshed: u32,
    pub companies_failed: u32,
    pub users_checked: u32,
    /// Users without a refreshed company or without access
    pub users_skipped: u32,
    pub users_failed: u32,
    pub notifications_sent: u32,
    pub deliveries_failed: u32,
    /// Delivered, but the new watermark could not be stored
    pub watermark_writes_failed: u32,
}

/// Background job that pushes balance/ride changes to users.
///
/// Shares nothing with request handling except the store and the transport.
#[derive(Clone)]
pub struct ChangeNotifier {
    store: CredentialStore,
    companies: CompanyService,
    transport: Arc<dyn ChatTransport>,
    signals: Vec<ChangeSignal>,
    interval: Duration,
    timeout: Duration,
}

impl ChangeNotifier {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            store: ctx.store.clone(),
            companies: ctx.companies.clone(),
            transport: ctx.transport.clone(),
            signals: ctx.config.notify_signals.clone(),
            interval: ctx.config.notify_interval,
            timeout: ctx.config.io_timeout,
        }
    }

    /// Start ticking on the runtime; the first tick fires one interval from now.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            signals = ?self.signals,
            "Change notifier started"
        );
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let report = self.tick().await;
            tracing::info!(?report, "Notifier tick finished");
        }
    }

    /// Run one full scan.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        if self.signals.is_empty() {
            return report;
        }

        let snapshot = self.snapshot(&mut report).await;

        let user_ids = match self.store.list_user_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list users, skipping tick");
                return report;
            }
        };

        for user_id in user_ids {
            report.users_checked += 1;
            if let Err(e) = self.process_user(user_id, &snapshot, &mut report).await {
                report.users_failed += 1;
                tracing::warn!(user_id, error = %e, "Failed to process user");
            }
        }

        report
    }

    // ─── Company Snapshot ────────────────────────────────────────────────────

    async fn snapshot(&self, report: &mut TickReport) -> HashMap<i64, Company> {
        let company_ids = match self.store.list_company_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list companies");
                return HashMap::new();
            }
        };

        let results: Vec<(i64, Result<Company, AppError>)> = stream::iter(company_ids)
            .map(|id| async move { (id, self.refresh_company(id).await) })
            .buffer_unordered(MAX_CONCURRENT_REFRESHES)
            .collect()
            .await;

        let mut snapshot = HashMap::with_capacity(results.len());
        for (id, result) in results {
            match result {
                Ok(company) => {
                    report.companies_refreshed += 1;
                    snapshot.insert(id, company);
                }
                Err(e) => {
                    report.companies_failed += 1;
                    tracing::warn!(company_id = id, error = %e, "Company refresh failed, skipping this tick");
                }
            }
        }
        snapshot
    }

    async fn refresh_company(&self, id: i64) -> Result<Company, AppError> {
        let mut company = self.store.load_company(id).await?;

        self.companies.refresh_info(&mut company).await?;
        // Admins don't depend on the roster; fall back to the stored one.
        if let Err(e) = self.companies.refresh_employees(&mut company).await {
            tracing::warn!(company_id = id, error = %e, "Roster refresh failed, using stored roster");
        }
        if self.signals.contains(&ChangeSignal::LastRide) {
            self.companies.refresh_rides(&mut company, 1).await?;
        }

        // Keep the refreshed session so the next tick doesn't log in again.
        if let Err(e) = self.store.store_refresh(&company).await {
            tracing::warn!(company_id = id, error = %e, "Failed to persist refreshed company");
        }

        Ok(company)
    }

    // ─── Per-User Processing ─────────────────────────────────────────────────

    async fn process_user(
        &self,
        user_id: i64,
        snapshot: &HashMap<i64, Company>,
        report: &mut TickReport,
    ) -> Result<(), AppError> {
        let user = self.store.load_user(user_id).await?;

        let Some(company) = snapshot.get(&user.company_id) else {
            report.users_skipped += 1;
            tracing::trace!(user_id, company_id = user.company_id, "No refreshed company for user");
            return Ok(());
        };

        let role = permissions::resolve(&user, company);
        if role == Role::None {
            report.users_skipped += 1;
            tracing::warn!(
                user_id,
                company_id = company.id,
                "User no longer has access to the bound company, not notifying"
            );
            return Ok(());
        }

        for &signal in &self.signals {
            let Some(observed) = signal.changed(company, &user) else {
                continue;
            };
            self.deliver(&user, company, signal, observed, report).await;
        }

        Ok(())
    }

    async fn deliver(
        &self,
        user: &User,
        company: &Company,
        signal: ChangeSignal,
        observed: Observation,
        report: &mut TickReport,
    ) {
        let text = signal.message(company);
        let sent = bounded(
            self.timeout,
            "notification send",
            self.transport
                .send(user.id, OutboundMessage::Text(text), Menu::None),
        )
        .await;

        if let Err(e) = sent {
            report.deliveries_failed += 1;
            tracing::warn!(
                user_id = user.id,
                signal = signal.name(),
                error = %e,
                "Notification not delivered, will retry next tick"
            );
            return;
        }
        report.notifications_sent += 1;

        // The value belongs to this company; a user re-bound meanwhile keeps
        // the watermark of their new company.
        let company_id = company.id;
        let mut advanced = false;
        let written = self
            .store
            .update_user(user.id, |stored| {
                if stored.company_id == company_id {
                    signal.advance(stored, observed);
                    advanced = true;
                }
            })
            .await;
        match written {
            Ok(_) if advanced => {
                tracing::debug!(user_id = user.id, signal = signal.name(), ?observed, "Watermark advanced");
            }
            Ok(stored) => {
                tracing::info!(
                    user_id = user.id,
                    notified_for = company_id,
                    bound_to = stored.company_id,
                    "User re-bound during delivery, watermark left alone"
                );
            }
            Err(e) => {
                report.watermark_writes_failed += 1;
                tracing::warn!(
                    user_id = user.id,
                    signal = signal.name(),
                    error = %e,
                    "Delivered but failed to store watermark; user may be notified again"
                );
            }
        }
    }
}
