// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background refresh: proactive before expiry, reactive after a 401.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::credential::flow::AuthorizationFlow;
use crate::credential::session::Session;
use crate::credential::AuthError;

/// What one scheduler cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No session (or nothing to refresh with).
    Idle,
    /// The access token is outside the refresh margin.
    Fresh,
    Refreshed,
    Failed(AuthError),
}

/// Run one cycle: purge abandoned logins, then refresh if due.
pub async fn run_cycle(session: &Session, flow: &AuthorizationFlow) -> CycleOutcome {
    let purged = flow.purge_expired();
    if purged > 0 {
        tracing::debug!(purged, "dropped expired login attempts");
    }

    let Some(record) = session.store().get() else {
        return CycleOutcome::Idle;
    };
    let Some(generation) = session.needs_refresh() else {
        if record.refresh_token.is_none() && record.is_expired() {
            return CycleOutcome::Idle;
        }
        return CycleOutcome::Fresh;
    };

    match session.refresh(generation, session.policy().max_attempts).await {
        Ok(_) => CycleOutcome::Refreshed,
        Err(e) => CycleOutcome::Failed(e),
    }
}

/// Spawn the refresh loop. Ticks every `interval` and wakes early when a
/// caller invalidates the current token.
pub fn spawn_refresh_scheduler(
    session: Arc<Session>,
    flow: Arc<AuthorizationFlow>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
                _ = session.invalidation_notified() => {
                    tracing::debug!("refresh scheduler woken by invalidation");
                }
            }

            // A refresh blocked on backoff must not outlive shutdown, but one
            // that already completed is kept.
            let outcome = tokio::select! {
                biased;
                outcome = run_cycle(&session, &flow) => outcome,
                _ = shutdown.cancelled() => break,
            };
            if let CycleOutcome::Failed(ref e) = outcome {
                if !e.is_fatal() {
                    tracing::warn!(err = %e, "refresh attempts exhausted, retrying next cycle");
                }
            }
        }
        tracing::debug!("refresh scheduler stopped");
    })
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
