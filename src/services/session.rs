// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Portal session: a bearer token plus its expiry claim.
//!
//! The session only talks to the portal when the token is missing or about
//! to expire. Persisting a refreshed session is the caller's job.

use crate::error::AppError;
use crate::services::portal::PortalClient;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tokens expiring within this window count as expired, so a token checked
/// valid cannot lapse before the request that uses it lands.
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 30;

/// Portal login credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bearer token issued by the portal with the claims we care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaim {
    pub token: String,
    /// Expiry (Unix timestamp, seconds); never 0 for a decoded token
    pub expires_at: i64,
    #[serde(default)]
    pub company_id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Claims section of the portal JWT.
#[derive(Debug, Deserialize)]
struct PortalClaims {
    #[serde(default)]
    exp: i64,
    #[serde(default)]
    user: Vec<PortalClaimUser>,
}

#[derive(Debug, Deserialize)]
struct PortalClaimUser {
    #[serde(default)]
    company_id: f64,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

impl TokenClaim {
    /// Read the claims of a portal JWT.
    ///
    /// The signature is not verified: the token is only ever sent back to
    /// the portal that issued it, which does verify it.
    pub fn decode(raw: &str) -> Result<Self, AppError> {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<PortalClaims>(raw, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| AppError::Auth(format!("malformed session token: {}", e)))?;

        if data.claims.exp == 0 {
            return Err(AppError::Auth("session token carries no expiry".to_string()));
        }

        let user = data
            .claims
            .user
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Auth("session token names no company".to_string()))?;

        Ok(Self {
            token: raw.to_string(),
            expires_at: data.claims.exp,
            company_id: user.company_id as i64,
            first_name: user.first_name,
            last_name: user.last_name,
        })
    }

    /// Valid when the expiry lies beyond `now` plus the safety margin.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at != 0 && now.timestamp() + TOKEN_EXPIRY_MARGIN_SECS < self.expires_at
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Session state embedded in a stored company.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalSession {
    #[serde(default)]
    token: Option<TokenClaim>,
}

impl PortalSession {
    pub fn with_token(claim: TokenClaim) -> Self {
        Self { token: Some(claim) }
    }

    pub fn token(&self) -> Option<&TokenClaim> {
        self.token.as_ref()
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_valid_at(now))
    }

    /// Forget the token, e.g. after the portal rejected it.
    pub fn invalidate(&mut self) {
        self.token = None;
    }

    /// Return a valid token, logging in again only if needed.
    pub async fn ensure_valid(
        &mut self,
        portal: &dyn PortalClient,
        credentials: &Credentials,
    ) -> Result<&TokenClaim, AppError> {
        self.ensure_valid_at(portal, credentials, Utc::now()).await
    }

    /// [`Self::ensure_valid`] against an explicit clock.
    ///
    /// On any login failure the previous token is left in place and
    /// [`AppError::Auth`] is returned.
    pub async fn ensure_valid_at(
        &mut self,
        portal: &dyn PortalClient,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> Result<&TokenClaim, AppError> {
        if !self.is_valid_at(now) {
            tracing::info!(login = %credentials.login, "Portal token missing or expiring, logging in");

            let claim = match portal.login(&credentials.login, &credentials.password).await {
                Ok(claim) => claim,
                Err(AppError::Auth(msg)) => return Err(AppError::Auth(msg)),
                Err(e) => {
                    tracing::warn!(error = %e, login = %credentials.login, "Portal login failed");
                    return Err(AppError::Auth(format!("login failed: {}", e)));
                }
            };

            if !claim.is_valid_at(now) {
                return Err(AppError::Auth("portal issued an expired token".to_string()));
            }

            self.token = Some(claim);
            tracing::info!(login = %credentials.login, "Portal token refreshed");
        }

        self.token
            .as_ref()
            .ok_or_else(|| AppError::Auth("no session token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn portal_jwt(exp: i64, company_id: f64) -> String {
        let claims = serde_json::json!({
            "exp": exp,
            "user": [{"company_id": company_id, "first_name": "Anna", "last_name": "Smirnova"}]
        });
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"portal-side-secret"),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_reads_claims_without_key() {
        let raw = portal_jwt(1_900_000_000, 7.0);
        let claim = TokenClaim::decode(&raw).unwrap();
        assert_eq!(claim.expires_at, 1_900_000_000);
        assert_eq!(claim.company_id, 7);
        assert_eq!(claim.display_name(), "Anna Smirnova");
        assert_eq!(claim.token, raw);
    }

    #[test]
    fn test_decode_rejects_missing_expiry() {
        let raw = portal_jwt(0, 7.0);
        assert!(matches!(TokenClaim::decode(&raw), Err(AppError::Auth(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            TokenClaim::decode("not-a-jwt"),
            Err(AppError::Auth(_))
        ));
    }

    #[test]
    fn test_validity_respects_margin() {
        let now = DateTime::from_timestamp(1_000_000, 0).unwrap();
        let claim = TokenClaim {
            token: "t".to_string(),
            expires_at: 1_000_000 + TOKEN_EXPIRY_MARGIN_SECS,
            company_id: 1,
            first_name: String::new(),
            last_name: String::new(),
        };
        assert!(!claim.is_valid_at(now));

        let later = TokenClaim {
            expires_at: 1_000_000 + TOKEN_EXPIRY_MARGIN_SECS + 1,
            ..claim
        };
        assert!(later.is_valid_at(now));
    }

    #[test]
    fn test_empty_session_is_invalid() {
        assert!(!PortalSession::default().is_valid_at(Utc::now()));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials {
            login: "corp".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
