// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth2 session with the vendor cloud API.
//!
//! [`store::TokenStore`] holds the single authoritative [`TokenRecord`].
//! [`flow::AuthorizationFlow`] drives the browser login (authorization code +
//! PKCE) and installs the exchanged tokens. [`session::Session`] hands out
//! bearer tokens to the scrape path and serializes refreshes, and
//! [`scheduler`] keeps the record fresh in the background.

pub mod cipher;
pub mod flow;
pub mod oauth;
pub mod persist;
pub mod pkce;
pub mod refresh;
pub mod scheduler;
pub mod session;
pub mod store;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::credential::oauth::TokenResponse;

/// Longest lifetime accepted for an access token. Larger `expires_in`
/// values are clamped to it.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Instant `lifetime` from now, clamped to [`MAX_TOKEN_LIFETIME`].
pub fn expiry_after(lifetime: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(lifetime.min(MAX_TOKEN_LIFETIME)).unwrap_or(now)
}

/// The current set of vendor credentials.
///
/// Records are only ever replaced whole. `generation` is assigned by the
/// store on `set` and identifies which record a refresh was started from.
#[derive(Clone)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Instant,
    pub scope: BTreeSet<String>,
    pub generation: u64,
}

impl TokenRecord {
    /// Build a record from a token endpoint response issued now.
    ///
    /// `used_refresh_token` is the refresh token that produced this response.
    /// It is carried over only when the vendor did not rotate it.
    pub fn from_response(resp: TokenResponse, used_refresh_token: Option<&str>) -> Self {
        let refresh_token = match resp.refresh_token {
            Some(rt) if !rt.is_empty() => Some(rt),
            _ => used_refresh_token.map(str::to_owned),
        };
        Self {
            access_token: resp.access_token,
            refresh_token,
            expires_at: expiry_after(Duration::from_secs(resp.expires_in)),
            scope: parse_scope(resp.scope.as_deref().unwrap_or_default()),
            generation: 0,
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// True when the token expires within `margin` of now (or already has).
    pub fn expires_within(&self, margin: Duration) -> bool {
        match Instant::now().checked_add(margin) {
            Some(horizon) => horizon >= self.expires_at,
            None => true,
        }
    }

    pub fn expires_in(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn scope_string(&self) -> String {
        self.scope.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
    }
}

// Token values never reach logs.
impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in())
            .field("scope", &self.scope)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Split a space-delimited OAuth scope string.
pub fn parse_scope(scope: &str) -> BTreeSet<String> {
    scope.split_whitespace().map(str::to_owned).collect()
}

/// Failures of the authorization and refresh paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Callback `state` is missing, forged, already used or expired.
    InvalidState,
    /// The user declined consent or the vendor reported an error on the callback.
    VendorDenied(String),
    /// The authorization code could not be exchanged. Never retried.
    TokenExchangeFailed(String),
    /// Network error, timeout or 5xx while refreshing. Retried with backoff.
    RefreshTransient(String),
    /// The refresh token is invalid, expired or revoked. Clears the session.
    RefreshFatal(String),
}

impl AuthError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidState => "invalid_state",
            Self::VendorDenied(_) => "vendor_denied",
            Self::TokenExchangeFailed(_) => "token_exchange_failed",
            Self::RefreshTransient(_) => "refresh_transient_failure",
            Self::RefreshFatal(_) => "refresh_fatal",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RefreshFatal(_))
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState => f.write_str("invalid or expired authorization state"),
            Self::VendorDenied(msg) => write!(f, "authorization denied: {msg}"),
            Self::TokenExchangeFailed(msg) => write!(f, "token exchange failed: {msg}"),
            Self::RefreshTransient(msg) => write!(f, "transient refresh failure: {msg}"),
            Self::RefreshFatal(msg) => write!(f, "refresh token rejected: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

/// No usable credential; an interactive login is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeedsLogin;

impl fmt::Display for NeedsLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("interactive login required")
    }
}

/// Externally observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    /// No token yet, but a login is pending.
    Authorizing,
    Authenticated,
    /// A record exists but its access token has expired.
    Expired,
}

impl SessionState {
    pub fn resolve(record: Option<&TokenRecord>, pending_logins: usize) -> Self {
        match record {
            Some(r) if r.is_expired() => Self::Expired,
            Some(_) => Self::Authenticated,
            None if pending_logins > 0 => Self::Authorizing,
            None => Self::Unauthenticated,
        }
    }
}

/// Counters shared by the login and refresh paths, read on each scrape.
#[derive(Debug, Default)]
pub struct AuthStats {
    pub exchanges_ok: AtomicU64,
    pub exchanges_failed: AtomicU64,
    pub refreshes_ok: AtomicU64,
    pub refreshes_failed: AtomicU64,
    last_refresh_at_ms: AtomicU64,
    /// Micros spent in the last exchange / refresh, 0 before the first.
    last_exchange_us: AtomicU64,
    last_refresh_us: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl AuthStats {
    pub fn exchange_succeeded(&self) {
        self.exchanges_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn exchange_failed(&self, err: &AuthError) {
        self.exchanges_failed.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(err.to_string());
    }

    pub fn refresh_succeeded(&self) {
        self.refreshes_ok.fetch_add(1, Ordering::Relaxed);
        self.last_refresh_at_ms.store(epoch_ms(), Ordering::Relaxed);
    }

    pub fn refresh_failed(&self, err: &AuthError) {
        self.refreshes_failed.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(err.to_string());
    }

    pub fn exchange_took(&self, elapsed: Duration) {
        self.last_exchange_us.store(elapsed.as_micros().max(1) as u64, Ordering::Relaxed);
    }

    pub fn refresh_took(&self, elapsed: Duration) {
        self.last_refresh_us.store(elapsed.as_micros().max(1) as u64, Ordering::Relaxed);
    }

    pub fn last_exchange_duration(&self) -> Option<Duration> {
        micros(&self.last_exchange_us)
    }

    pub fn last_refresh_duration(&self) -> Option<Duration> {
        micros(&self.last_refresh_us)
    }

    /// Epoch millis of the last successful refresh, if any.
    pub fn last_refresh_at_ms(&self) -> Option<u64> {
        match self.last_refresh_at_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

fn micros(cell: &AtomicU64) -> Option<Duration> {
    match cell.load(Ordering::Relaxed) {
        0 => None,
        us => Some(Duration::from_micros(us)),
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
