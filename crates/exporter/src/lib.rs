// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prometheus exporter for the Viessmann IoT API.
//!
//! Logs in through the browser (OAuth2 authorization code + PKCE), keeps the
//! access token fresh in the background and serves device features on
//! `/metrics`.

pub mod config;
pub mod credential;
pub mod error;
pub mod metrics;
pub mod state;
pub mod telemetry;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::credential::persist::spawn_persistence;
use crate::credential::scheduler::spawn_refresh_scheduler;
use crate::state::AppState;
use crate::transport::build_router;

/// Install the process-wide rustls crypto provider. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Run the exporter until ctrl-c.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::new(config)?);

    // Stopped only after the scheduler, so its last write reaches disk.
    let persist_stop = CancellationToken::new();
    let persister = match state.persistence {
        Some(ref persistence) => {
            match persistence.restore() {
                Ok(Some(record)) => {
                    let expired = record.is_expired();
                    state.session.store().set(record);
                    tracing::info!(path = %persistence.path().display(), expired, "restored saved session");
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(err = %e, path = %persistence.path().display(), "ignoring unreadable token store");
                }
            }
            Some(spawn_persistence(
                Arc::clone(state.session.store()),
                Arc::clone(persistence),
                persist_stop.clone(),
            ))
        }
        None => None,
    };

    let scheduler = spawn_refresh_scheduler(
        Arc::clone(&state.session),
        Arc::clone(&state.flow),
        state.config.refresh_interval(),
        shutdown.clone(),
    );

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down");
            }
            shutdown.cancel();
        });
    }

    if state.device.is_none() {
        tracing::warn!("no device configured; /metrics reports session state only");
    }

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("viessmann-exporter listening on {addr}");
    let router = build_router(state);
    let served =
        axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned()).await;
    shutdown.cancel();

    if let Err(e) = scheduler.await {
        tracing::warn!(err = %e, "refresh scheduler ended abnormally");
    }
    persist_stop.cancel();
    if let Some(persister) = persister {
        if let Err(e) = persister.await {
            tracing::warn!(err = %e, "token persistence ended abnormally");
        }
    }

    served?;
    Ok(())
}
