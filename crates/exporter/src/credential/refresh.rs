// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth token refresh with retries.

use std::time::Duration;

use crate::credential::oauth::{TokenClient, TokenResponse};
use crate::credential::AuthError;

/// When to refresh and how hard to retry.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    /// Refresh once the access token expires within this window.
    pub margin: Duration,
    /// Total attempts per background refresh (at least 1).
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            margin: Duration::from_secs(60),
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Refresh with exponential backoff on transient failures.
///
/// A fatal classification stops immediately; retrying a rejected refresh
/// token cannot succeed.
pub async fn refresh_with_retries(
    client: &TokenClient,
    refresh_token: &str,
    policy: &RefreshPolicy,
    attempts: u32,
) -> Result<TokenResponse, AuthError> {
    let attempts = attempts.max(1);
    let mut backoff = policy.initial_backoff;

    let mut attempt = 1;
    loop {
        match client.refresh(refresh_token).await {
            Ok(token) => return Ok(token),
            Err(e) if e.is_fatal() || attempt >= attempts => return Err(e),
            Err(e) => {
                tracing::debug!(attempt, err = %e, ?backoff, "refresh attempt failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
