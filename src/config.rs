//! Application configuration loaded from environment variables.
//!
//! A `.env` file is honoured for local development.

use crate::services::crypto::CredentialCipher;
use crate::services::notifier::ChangeSignal;
use std::env;
use std::time::Duration;

/// Which document store backs the credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local store, for local runs without GCP access.
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram Bot API token
    pub telegram_token: String,
    /// Secret Telegram echoes in `X-Telegram-Bot-Api-Secret-Token`
    pub webhook_secret: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Deployment environment; namespaces the store collections
    pub environment: String,
    pub store_backend: StoreBackend,
    /// Portal API origin
    pub portal_base_url: String,
    /// Delay between notifier ticks (strictly positive)
    pub notify_interval: Duration,
    /// Signals the notifier watches
    pub notify_signals: Vec<ChangeSignal>,
    /// Upper bound for any single portal/store/transport call
    pub io_timeout: Duration,
    /// Balance below which admins are asked to top up
    pub low_balance_threshold: f64,
    /// Seals stored portal passwords; `None` only in debug builds
    pub credentials_cipher: Option<CredentialCipher>,
    /// Server port
    pub port: u16,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            telegram_token: "test_telegram_token".to_string(),
            webhook_secret: "test_webhook_secret".to_string(),
            gcp_project_id: "test-project".to_string(),
            environment: "test".to_string(),
            store_backend: StoreBackend::Memory,
            portal_base_url: DEFAULT_PORTAL_BASE_URL.to_string(),
            notify_interval: Duration::from_secs(300),
            notify_signals: vec![ChangeSignal::Balance, ChangeSignal::LastRide],
            io_timeout: Duration::from_secs(15),
            low_balance_threshold: 1000.0,
            credentials_cipher: None,
            port: 8080,
        }
    }
}

const DEFAULT_PORTAL_BASE_URL: &str = "https://b2b-api.delitime.ru";

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "firestore".to_string())
            .as_str()
        {
            "firestore" => StoreBackend::Firestore,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid(
                    "STORE_BACKEND",
                    format!("unknown backend '{}'", other),
                ))
            }
        };

        Ok(Self {
            telegram_token: env::var("TELEGRAM_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("TELEGRAM_TOKEN"))?,
            webhook_secret: env::var("WEBHOOK_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("WEBHOOK_SECRET"))?,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            store_backend,
            portal_base_url: env::var("PORTAL_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PORTAL_BASE_URL.to_string()),
            notify_interval: positive_secs("NOTIFY_INTERVAL_SECS", 300)?,
            notify_signals: parse_signals(
                &env::var("NOTIFY_SIGNALS").unwrap_or_else(|_| "balance,rides".to_string()),
            )?,
            io_timeout: positive_secs("IO_TIMEOUT_SECS", 15)?,
            low_balance_threshold: env::var("LOW_BALANCE_THRESHOLD")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::Invalid("LOW_BALANCE_THRESHOLD", "not a number".to_string())
                })?,
            credentials_cipher: credentials_cipher()?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
        })
    }
}

/// Read a whole number of seconds that must be greater than zero.
fn positive_secs(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let secs: u64 = match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, format!("'{}' is not a number", raw)))?,
        Err(_) => default,
    };
    if secs == 0 {
        return Err(ConfigError::Invalid(name, "must be positive".to_string()));
    }
    Ok(Duration::from_secs(secs))
}

/// Cipher from `CREDENTIALS_KEY` (base64, 32 bytes).
///
/// Release builds refuse to start without it.
fn credentials_cipher() -> Result<Option<CredentialCipher>, ConfigError> {
    match env::var("CREDENTIALS_KEY") {
        Ok(raw) => parse_credentials_key(&raw).map(Some),
        Err(_) if cfg!(debug_assertions) => Ok(None),
        Err(_) => Err(ConfigError::Missing("CREDENTIALS_KEY")),
    }
}

fn parse_credentials_key(raw: &str) -> Result<CredentialCipher, ConfigError> {
    CredentialCipher::from_base64(raw.trim())
        .map_err(|e| ConfigError::Invalid("CREDENTIALS_KEY", e.to_string()))
}

/// Parse a comma separated signal list such as `balance,rides`.
pub fn parse_signals(raw: &str) -> Result<Vec<ChangeSignal>, ConfigError> {
    let mut signals = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let signal = match part {
            "balance" => ChangeSignal::Balance,
            "rides" | "ride" => ChangeSignal::LastRide,
            other => {
                return Err(ConfigError::Invalid(
                    "NOTIFY_SIGNALS",
                    format!("unknown signal '{}'", other),
                ))
            }
        };
        if !signals.contains(&signal) {
            signals.push(signal);
        }
    }
    Ok(signals)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
