// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser login: authorization code + PKCE against the vendor IdP.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use url::Url;

use crate::credential::oauth::TokenClient;
use crate::credential::pkce;
use crate::credential::store::TokenStore;
use crate::credential::{AuthError, AuthStats, TokenRecord};

/// Most logins kept pending at once. Starting another evicts the oldest.
pub const MAX_PENDING_LOGINS: usize = 32;

/// Static login parameters.
#[derive(Debug, Clone)]
pub struct LoginSettings {
    pub authorize_url: Url,
    pub scope: String,
    /// How long a started login stays redeemable.
    pub attempt_ttl: Duration,
}

/// Query parameters delivered to the redirect URI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// One pending login, keyed by its state nonce.
struct AuthorizationAttempt {
    pkce_verifier: String,
    /// Start order, used to pick the oldest attempt for eviction.
    seq: u64,
    created_at: Instant,
    expires_at: Instant,
}

/// Owns pending logins and installs exchanged tokens into the store.
pub struct AuthorizationFlow {
    settings: LoginSettings,
    tokens: Arc<TokenClient>,
    store: Arc<TokenStore>,
    stats: Arc<AuthStats>,
    attempts: Mutex<HashMap<String, AuthorizationAttempt>>,
    next_seq: AtomicU64,
}

impl AuthorizationFlow {
    pub fn new(
        settings: LoginSettings,
        tokens: Arc<TokenClient>,
        store: Arc<TokenStore>,
        stats: Arc<AuthStats>,
    ) -> Self {
        Self {
            settings,
            tokens,
            store,
            stats,
            attempts: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Start a login. Returns the vendor authorization URL to redirect to.
    pub fn begin_login(&self) -> Url {
        let verifier = pkce::generate_code_verifier();
        let challenge = pkce::compute_code_challenge(&verifier);
        let state = pkce::generate_state();

        let url = pkce::build_auth_url(
            &self.settings.authorize_url,
            self.tokens.client_id(),
            self.tokens.redirect_uri(),
            &self.settings.scope,
            &challenge,
            &state,
        );

        let now = Instant::now();
        let mut attempts = self.attempts.lock();
        attempts.retain(|_, a| a.expires_at > now);
        while attempts.len() >= MAX_PENDING_LOGINS {
            let oldest = attempts.iter().min_by_key(|(_, a)| a.seq).map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    attempts.remove(&key);
                    tracing::debug!("evicted oldest pending login");
                }
                None => break,
            }
        }
        attempts.insert(
            state,
            AuthorizationAttempt {
                pkce_verifier: verifier,
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                created_at: now,
                expires_at: now + self.settings.attempt_ttl,
            },
        );
        tracing::info!(pending = attempts.len(), "login started");
        url
    }

    /// Validate a callback, exchange the code and store the new record.
    pub async fn handle_callback(&self, params: CallbackParams) -> Result<TokenRecord, AuthError> {
        let result = self.redeem(params).await;
        match result {
            Ok(ref record) => {
                self.stats.exchange_succeeded();
                tracing::info!(generation = record.generation, scope = %record.scope_string(), "login completed");
            }
            Err(ref e) => {
                self.stats.exchange_failed(e);
                tracing::warn!(err = %e, code = e.as_str(), "login callback rejected");
            }
        }
        result
    }

    async fn redeem(&self, params: CallbackParams) -> Result<TokenRecord, AuthError> {
        // Consume the attempt before any await so a state is redeemable once.
        let attempt = {
            let now = Instant::now();
            let mut attempts = self.attempts.lock();
            let attempt = params.state.as_deref().and_then(|s| attempts.remove(s));
            attempts.retain(|_, a| a.expires_at > now);
            match attempt {
                Some(a) if a.expires_at > now => a,
                _ => return Err(AuthError::InvalidState),
            }
        };
        tracing::debug!(age = ?attempt.created_at.elapsed(), "callback matched pending login");

        if let Some(error) = params.error {
            let detail = match params.error_description {
                Some(desc) if !desc.is_empty() => format!("{error}: {desc}"),
                _ => error,
            };
            return Err(AuthError::VendorDenied(detail));
        }

        let code = match params.code {
            Some(code) if !code.is_empty() => code,
            _ => return Err(AuthError::TokenExchangeFailed("callback carried no code".to_owned())),
        };

        let started = Instant::now();
        let resp = self.tokens.exchange_code(&code, &attempt.pkce_verifier).await;
        self.stats.exchange_took(started.elapsed());
        let resp = resp?;
        let mut record = TokenRecord::from_response(resp, None);
        record.generation = self.store.set(record.clone());
        Ok(record)
    }

    /// Drop abandoned logins. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut attempts = self.attempts.lock();
        let before = attempts.len();
        attempts.retain(|_, a| a.expires_at > now);
        before - attempts.len()
    }

    /// Number of logins started but not yet redeemed or expired.
    pub fn pending(&self) -> usize {
        let now = Instant::now();
        self.attempts.lock().values().filter(|a| a.expires_at > now).count()
    }
}

#[cfg(test)]
#[path = "flow_tests.rs"]
mod tests;
