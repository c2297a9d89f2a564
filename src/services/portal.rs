// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Car-sharing B2B portal API client.
//!
//! Handles:
//! - Login (bearer token issue)
//! - Company info, rides and employee roster
//! - Invoice creation and document download
//!
//! Every portal response is wrapped in a `{success, message}` envelope.

use crate::error::AppError;
use crate::models::Ride;
use crate::services::session::TokenClaim;
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Portal capabilities the bot depends on.
#[async_trait]
pub trait PortalClient: Send + Sync {
    /// Exchange credentials for a bearer token.
    async fn login(&self, login: &str, password: &str) -> Result<TokenClaim, AppError>;

    async fn fetch_company_info(&self, token: &str, company_id: i64)
        -> Result<CompanyInfo, AppError>;

    /// Rides, most recent first.
    async fn fetch_rides(
        &self,
        token: &str,
        company_id: i64,
        limit: u32,
        page: u32,
    ) -> Result<Vec<Ride>, AppError>;

    /// Employee roster as phone numbers.
    async fn fetch_employees(&self, token: &str, company_id: i64) -> Result<Vec<String>, AppError>;

    async fn create_invoice(
        &self,
        token: &str,
        company_id: i64,
        amount: f64,
    ) -> Result<InvoiceRef, AppError>;

    /// Download the newest document of `kind` issued this month.
    async fn fetch_latest_file(
        &self,
        token: &str,
        company_id: i64,
        kind: &str,
    ) -> Result<FileBlob, AppError>;
}

/// Company information block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompanyInfo {
    pub id: i64,
    #[serde(rename = "company_name", default)]
    pub name: String,
    #[serde(rename = "total_sum", default)]
    pub balance: f64,
    #[serde(rename = "isCreatingInvoicesAllowed", default)]
    pub can_create_invoice: bool,
    #[serde(rename = "minInvoiceAmount", default)]
    pub min_invoice_amount: f64,
}

/// Identifier of a freshly created invoice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvoiceRef(pub i64);

/// A downloaded portal document.
#[derive(Debug, Clone, PartialEq)]
pub struct FileBlob {
    pub file_name: String,
    pub mime: String,
    pub data: Vec<u8>,
}

/// Document listing entry.
#[derive(Debug, Clone, Deserialize)]
struct PortalDocument {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Employee {
    #[serde(default)]
    phone: String,
}

/// Response envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: serde_json::Value,
}

impl Envelope {
    fn into_message<T: DeserializeOwned>(self) -> Result<T, AppError> {
        if !self.success {
            let reason = self
                .message
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| "request was not successful".to_string());
            return Err(AppError::PortalApi(reason));
        }
        serde_json::from_value(self.message)
            .map_err(|e| AppError::PortalApi(format!("Unexpected response shape: {}", e)))
    }
}

/// HTTP implementation of [`PortalClient`].
#[derive(Clone)]
pub struct HttpPortalClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpPortalClient {
    /// Create a client against `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client error: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn company_url(&self, company_id: i64, path: &str) -> String {
        format!("{}/b2b/company/{}/{}", self.base_url, company_id, path)
    }

    /// Generic GET request returning the envelope message.
    async fn get_message<T: DeserializeOwned>(&self, url: &str, token: &str) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Portal request failed: {}", e)))?;

        self.check_envelope(response).await?.into_message()
    }

    /// Check response status and parse the envelope.
    async fn check_envelope(&self, response: reqwest::Response) -> Result<Envelope, AppError> {
        let response = self.check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| AppError::PortalApi(format!("JSON parse error: {}", e)))
    }

    /// Map non-2xx statuses into the error taxonomy.
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response, AppError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        // Unauthorized - token expired or revoked on the portal side
        if status.as_u16() == 401 {
            return Err(AppError::Auth(AppError::PORTAL_TOKEN_REJECTED.to_string()));
        }

        tracing::warn!(status = %status, "Portal returned an error status");
        Err(AppError::PortalApi(format!("HTTP {}: {}", status, body)))
    }
}

#[async_trait]
impl PortalClient for HttpPortalClient {
    async fn login(&self, login: &str, password: &str) -> Result<TokenClaim, AppError> {
        let url = format!("{}/b2b/auth", self.base_url);
        let body = serde_json::json!({
            "login": login,
            "password": password,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Login request failed: {}", e)))?;

        // Wrong credentials come back as 401 too; that's an auth failure, not a stale token.
        if response.status().as_u16() == 401 {
            return Err(AppError::Auth("wrong login or password".to_string()));
        }

        let raw: String = self.check_envelope(response).await?.into_message()?;
        TokenClaim::decode(&raw)
    }

    async fn fetch_company_info(
        &self,
        token: &str,
        company_id: i64,
    ) -> Result<CompanyInfo, AppError> {
        self.get_message(&self.company_url(company_id, "info"), token)
            .await
    }

    async fn fetch_rides(
        &self,
        token: &str,
        company_id: i64,
        limit: u32,
        page: u32,
    ) -> Result<Vec<Ride>, AppError> {
        let response = self
            .http
            .get(self.company_url(company_id, "transfers/all"))
            .bearer_auth(token)
            .query(&[("limit", limit.to_string()), ("page", page.to_string())])
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Portal request failed: {}", e)))?;

        self.check_envelope(response).await?.into_message()
    }

    async fn fetch_employees(&self, token: &str, company_id: i64) -> Result<Vec<String>, AppError> {
        let employees: Vec<Employee> = self
            .get_message(&self.company_url(company_id, "employees"), token)
            .await?;
        Ok(employees
            .into_iter()
            .map(|e| e.phone)
            .filter(|p| !p.is_empty())
            .collect())
    }

    async fn create_invoice(
        &self,
        token: &str,
        company_id: i64,
        amount: f64,
    ) -> Result<InvoiceRef, AppError> {
        let body = serde_json::json!({
            "invoice": {
                "amount": amount,
                "bill_number": company_id,
                "description": "Invoice",
                "created_at": Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            }
        });

        let response = self
            .http
            .post(self.company_url(company_id, "invoice/new"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Portal request failed: {}", e)))?;

        let number: f64 = self.check_envelope(response).await?.into_message()?;
        tracing::info!(company_id, amount, "Invoice created");
        Ok(InvoiceRef(number as i64))
    }

    async fn fetch_latest_file(
        &self,
        token: &str,
        company_id: i64,
        kind: &str,
    ) -> Result<FileBlob, AppError> {
        let now = Utc::now();
        let listing_url =
            self.company_url(company_id, &format!("docs/{}/{}", now.year(), now.month()));
        let documents: Vec<PortalDocument> = self.get_message(&listing_url, token).await?;

        // Document URLs embed a monotonically increasing id, so the max is the newest.
        let latest = documents
            .into_iter()
            .filter(|d| d.kind == kind && !d.url.is_empty())
            .max_by(|a, b| a.url.cmp(&b.url))
            .ok_or_else(|| AppError::NotFound(format!("No {} documents this month", kind)))?;

        let response = self
            .http
            .get(format!("{}{}", self.base_url, latest.url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Document download failed: {}", e)))?;

        let data = self
            .check_status(response)
            .await?
            .bytes()
            .await
            .map_err(|e| AppError::Network(format!("Document download failed: {}", e)))?;

        Ok(FileBlob {
            file_name: format!("{}.pdf", latest.title),
            mime: "application/pdf".to_string(),
            data: data.to_vec(),
        })
    }
}
