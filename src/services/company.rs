// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! High-level company operations over the portal API.
//!
//! Every call first makes sure the company's session is valid. If the
//! portal still rejects the token (revoked server-side), the session is
//! dropped and the call is retried once after a fresh login with the stored
//! credentials.

use crate::error::AppError;
use crate::models::Company;
use crate::services::portal::{FileBlob, PortalClient};
use crate::services::session::{Credentials, PortalSession, TokenClaim};
use crate::time_utils::bounded;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Document kind the portal uses for invoices.
pub const INVOICE_KIND: &str = "invoice";

/// Company-scoped portal service.
#[derive(Clone)]
pub struct CompanyService {
    portal: Arc<dyn PortalClient>,
    timeout: Duration,
}

impl CompanyService {
    pub fn new(portal: Arc<dyn PortalClient>, timeout: Duration) -> Self {
        Self { portal, timeout }
    }

    // ─── Session Handling ────────────────────────────────────────────────────

    async fn session_token(
        &self,
        company: &mut Company,
        credentials: &Credentials,
    ) -> Result<String, AppError> {
        let claim = bounded(
            self.timeout,
            "portal login",
            company.session.ensure_valid(self.portal.as_ref(), credentials),
        )
        .await?;
        Ok(claim.token.clone())
    }

    /// Run `op` with a valid bearer token, re-authenticating once on 401.
    async fn with_session<T, F, Fut>(
        &self,
        company: &mut Company,
        what: &str,
        op: F,
    ) -> Result<T, AppError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let credentials = company.credentials();
        let token = self.session_token(company, &credentials).await?;

        match bounded(self.timeout, what, op(token)).await {
            Err(e) if e.is_token_rejected() => {
                tracing::info!(
                    company_id = company.id,
                    operation = what,
                    "Portal rejected token, re-authenticating"
                );
                company.session.invalidate();
                let token = self.session_token(company, &credentials).await?;
                bounded(self.timeout, what, op(token)).await
            }
            other => other,
        }
    }

    /// Log in with new credentials and build the company they belong to.
    ///
    /// The returned company has fresh info and roster; the claim carries the
    /// portal user's name.
    pub async fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> Result<(Company, TokenClaim), AppError> {
        let credentials = Credentials {
            login: login.to_string(),
            password: password.to_string(),
        };
        let mut session = PortalSession::default();
        let claim = bounded(
            self.timeout,
            "portal login",
            session.ensure_valid(self.portal.as_ref(), &credentials),
        )
        .await?
        .clone();

        let mut company = Company::new(claim.company_id, login, password);
        company.session = session;
        self.refresh_info(&mut company).await?;
        self.refresh_employees(&mut company).await?;

        tracing::info!(company_id = company.id, "Company authenticated");
        Ok((company, claim))
    }

    // ─── Refreshers ──────────────────────────────────────────────────────────

    /// Refresh name, balance and invoice settings.
    pub async fn refresh_info(&self, company: &mut Company) -> Result<(), AppError> {
        let portal = self.portal.clone();
        let id = company.id;
        let info = self
            .with_session(company, "fetch company info", move |token| {
                let portal = portal.clone();
                async move { portal.fetch_company_info(&token, id).await }
            })
            .await?;

        company.name = info.name;
        company.balance = info.balance;
        company.can_create_invoice = info.can_create_invoice;
        company.min_invoice_amount = info.min_invoice_amount;
        Ok(())
    }

    /// Replace the ride list with the newest `limit` rides.
    pub async fn refresh_rides(&self, company: &mut Company, limit: u32) -> Result<(), AppError> {
        let portal = self.portal.clone();
        let id = company.id;
        company.rides = self
            .with_session(company, "fetch rides", move |token| {
                let portal = portal.clone();
                async move { portal.fetch_rides(&token, id, limit, 1).await }
            })
            .await?;
        Ok(())
    }

    /// Re-read the employee roster.
    pub async fn refresh_employees(&self, company: &mut Company) -> Result<(), AppError> {
        let portal = self.portal.clone();
        let id = company.id;
        company.employees = self
            .with_session(company, "fetch employees", move |token| {
                let portal = portal.clone();
                async move { portal.fetch_employees(&token, id).await }
            })
            .await?;
        Ok(())
    }

    // ─── Invoices ────────────────────────────────────────────────────────────

    /// Create an invoice for `amount` and return its document.
    ///
    /// Invoice settings are refreshed first so the limits checked are the
    /// portal's current ones.
    pub async fn create_invoice(
        &self,
        company: &mut Company,
        amount: f64,
    ) -> Result<FileBlob, AppError> {
        self.refresh_info(company).await?;

        if !company.can_create_invoice {
            return Err(AppError::BadRequest(
                "Invoices are disabled for this company on the portal.".to_string(),
            ));
        }
        if amount < company.min_invoice_amount {
            return Err(AppError::BadRequest(format!(
                "The minimum invoice amount is {:.2} ₽.",
                company.min_invoice_amount
            )));
        }

        let portal = self.portal.clone();
        let id = company.id;
        let invoice = self
            .with_session(company, "create invoice", move |token| {
                let portal = portal.clone();
                async move { portal.create_invoice(&token, id, amount).await }
            })
            .await?;
        tracing::info!(company_id = id, invoice = invoice.0, amount, "Invoice issued");

        self.latest_invoice(company).await
    }

    /// The newest invoice issued this month.
    pub async fn latest_invoice(&self, company: &mut Company) -> Result<FileBlob, AppError> {
        let portal = self.portal.clone();
        let id = company.id;
        self.with_session(company, "fetch latest invoice", move |token| {
            let portal = portal.clone();
            async move { portal.fetch_latest_file(&token, id, INVOICE_KIND).await }
        })
        .await
        .map_err(|e| match e {
            // Not the user record; don't send them back to onboarding.
            AppError::NotFound(_) => {
                AppError::BadRequest("No invoices have been issued this month yet.".to_string())
            }
            other => other,
        })
    }
}
