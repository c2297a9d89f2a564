// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! At-rest encryption of stored portal passwords.
//!
//! AES-256-GCM with a key from configuration. Sealed values are
//! `v1:` followed by base64(nonce || ciphertext || tag); anything without
//! the prefix is a password written before encryption was enabled and is
//! returned as is.

use crate::error::AppError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use std::sync::Arc;

const SEALED_PREFIX: &str = "v1:";

/// Key length expected in `CREDENTIALS_KEY` (after base64 decoding).
pub const KEY_LEN: usize = 32;

/// Symmetric cipher for credentials kept in the store.
#[derive(Clone)]
pub struct CredentialCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialCipher(..)")
    }
}

impl CredentialCipher {
    pub fn new(key: &[u8]) -> Result<Self, AppError> {
        if key.len() != KEY_LEN {
            return Err(AppError::BadRequest(format!(
                "credentials key must be {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, key)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Failed to build AES key")))?;
        Ok(Self {
            key: Arc::new(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        })
    }

    /// Build from a base64-encoded key.
    pub fn from_base64(encoded: &str) -> Result<Self, AppError> {
        let key = BASE64
            .decode(encoded)
            .map_err(|e| AppError::BadRequest(format!("credentials key is not base64: {}", e)))?;
        Self::new(&key)
    }

    pub fn is_sealed(value: &str) -> bool {
        value.starts_with(SEALED_PREFIX)
    }

    /// Encrypt with a fresh random nonce.
    pub fn seal(&self, plaintext: &str) -> Result<String, AppError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Nonce generation failed")))?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Credential encryption failed")))?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&in_out);
        Ok(format!("{}{}", SEALED_PREFIX, BASE64.encode(sealed)))
    }

    /// Decrypt a sealed value; unsealed values pass through.
    pub fn open(&self, stored: &str) -> Result<String, AppError> {
        let Some(encoded) = stored.strip_prefix(SEALED_PREFIX) else {
            return Ok(stored.to_string());
        };

        let mut sealed = BASE64.decode(encoded).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Sealed credential is not base64: {}", e))
        })?;
        if sealed.len() < NONCE_LEN {
            return Err(AppError::Internal(anyhow::anyhow!("Sealed credential is truncated")));
        }
        let mut ciphertext = sealed.split_off(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(&sealed)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Bad credential nonce")))?;

        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut ciphertext)
            .map_err(|_| {
                AppError::Internal(anyhow::anyhow!(
                    "Credential decryption failed (wrong CREDENTIALS_KEY?)"
                ))
            })?;
        String::from_utf8(plaintext.to_vec())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed: {}", e)))
    }
}
