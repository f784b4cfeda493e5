// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session coordinator: hands out bearer tokens and serializes refreshes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::futures::Notified;
use tokio::sync::{Mutex, Notify};

use crate::credential::oauth::TokenClient;
use crate::credential::refresh::{refresh_with_retries, RefreshPolicy};
use crate::credential::store::TokenStore;
use crate::credential::{AuthError, AuthStats, NeedsLogin, TokenRecord};

pub struct Session {
    store: Arc<TokenStore>,
    tokens: Arc<TokenClient>,
    policy: RefreshPolicy,
    stats: Arc<AuthStats>,
    /// Single-flight guard: at most one refresh request is in flight.
    refresh_lock: Mutex<()>,
    /// Generation of a record flagged invalid by a 401, or 0.
    invalidated: AtomicU64,
    wake: Notify,
}

impl Session {
    pub fn new(
        store: Arc<TokenStore>,
        tokens: Arc<TokenClient>,
        policy: RefreshPolicy,
        stats: Arc<AuthStats>,
    ) -> Self {
        Self {
            store,
            tokens,
            policy,
            stats,
            refresh_lock: Mutex::new(()),
            invalidated: AtomicU64::new(0),
            wake: Notify::new(),
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn stats(&self) -> &Arc<AuthStats> {
        &self.stats
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    /// A bearer token that has not expired at call time.
    ///
    /// An expired record is refreshed inline (one attempt, single-flight).
    pub async fn get_valid_token(&self) -> Result<String, NeedsLogin> {
        let record = self.store.get().ok_or(NeedsLogin)?;
        if !record.is_expired() {
            return Ok(record.access_token);
        }
        if record.refresh_token.is_none() {
            return Err(NeedsLogin);
        }

        match self.refresh(record.generation, 1).await {
            Ok(fresh) if !fresh.is_expired() => Ok(fresh.access_token),
            Ok(_) => Err(NeedsLogin),
            Err(e) => {
                tracing::debug!(err = %e, "inline refresh failed");
                Err(NeedsLogin)
            }
        }
    }

    /// Refresh the record that had generation `seen` when the caller looked.
    ///
    /// Callers that queued behind another refresh get its result instead of
    /// issuing a second request. A record installed by a concurrent login is
    /// never overwritten, and a fatal rejection only clears the record it
    /// was issued for.
    pub async fn refresh(&self, seen: u64, attempts: u32) -> Result<TokenRecord, AuthError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self
            .store
            .get()
            .ok_or_else(|| AuthError::RefreshFatal("no session to refresh".to_owned()))?;
        if current.generation != seen && !current.is_expired() && !self.is_invalidated(&current) {
            tracing::debug!(seen, current = current.generation, "refresh already done by another caller");
            return Ok(current);
        }
        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(|| AuthError::RefreshFatal("no refresh token".to_owned()))?;

        let started = Instant::now();
        let result = refresh_with_retries(&self.tokens, &refresh_token, &self.policy, attempts).await;
        self.stats.refresh_took(started.elapsed());
        match result {
            Ok(resp) => {
                let rotated = resp.refresh_token.as_deref().is_some_and(|rt| !rt.is_empty());
                let record = TokenRecord::from_response(resp, Some(&refresh_token));
                match self.store.replace_if(current.generation, record) {
                    Ok(stored) => {
                        self.stats.refresh_succeeded();
                        tracing::info!(
                            generation = stored.generation,
                            expires_in = stored.expires_in().as_secs(),
                            rotated,
                            "access token refreshed"
                        );
                        Ok(stored)
                    }
                    Err(Some(newer)) => {
                        self.stats.refresh_succeeded();
                        tracing::info!(generation = newer.generation, "newer login won over refresh");
                        Ok(newer)
                    }
                    Err(None) => Err(AuthError::RefreshFatal("session cleared during refresh".to_owned())),
                }
            }
            Err(e) => {
                self.stats.refresh_failed(&e);
                if e.is_fatal() {
                    if self.store.clear_if(current.generation) {
                        tracing::warn!(err = %e, "refresh token rejected, session cleared; login required");
                    }
                } else {
                    tracing::warn!(err = %e, attempts, "token refresh failed, will retry");
                }
                Err(e)
            }
        }
    }

    /// Manual refresh of the current record, whatever its expiry.
    pub async fn refresh_now(&self) -> Result<TokenRecord, AuthError> {
        let record = self
            .store
            .get()
            .filter(|r| r.refresh_token.is_some())
            .ok_or_else(|| AuthError::RefreshFatal("no session to refresh".to_owned()))?;
        self.refresh(record.generation, self.policy.max_attempts).await
    }

    /// Flag `access_token` as rejected by the vendor and wake the scheduler.
    ///
    /// Ignored when the token is no longer the current one.
    pub fn invalidate(&self, access_token: &str) {
        let Some(record) = self.store.get() else {
            return;
        };
        if record.access_token != access_token {
            return;
        }
        self.invalidated.store(record.generation, Ordering::Release);
        tracing::info!(generation = record.generation, "access token flagged invalid");
        self.wake.notify_one();
    }

    fn is_invalidated(&self, record: &TokenRecord) -> bool {
        self.invalidated.load(Ordering::Acquire) == record.generation
    }

    /// Generation of the current record if it is due for refresh.
    pub fn needs_refresh(&self) -> Option<u64> {
        let record = self.store.get()?;
        record.refresh_token.as_ref()?;
        let due = record.expires_within(self.policy.margin) || self.is_invalidated(&record);
        due.then_some(record.generation)
    }

    /// Resolves when a caller invalidates the current token.
    pub fn invalidation_notified(&self) -> Notified<'_> {
        self.wake.notified()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
