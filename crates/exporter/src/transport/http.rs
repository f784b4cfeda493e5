// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers: scrape, status and the login result pages.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::credential::SessionState;
use crate::error::{ApiError, ErrorCode};
use crate::metrics::CONTENT_TYPE as EXPOSITION_CONTENT_TYPE;
use crate::state::AppState;
use crate::telemetry;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenStatus {
    pub state: SessionState,
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub expires_in_secs: Option<u64>,
    pub scope: Option<String>,
    pub pending_logins: usize,
    /// Epoch millis of the last successful refresh.
    pub last_refresh_at: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub refreshed: bool,
}

#[derive(Debug, Deserialize)]
pub struct FailParams {
    pub error: Option<String>,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

/// `GET /metrics`: refresh device readings, then render the registry.
///
/// Auth problems never fail the scrape; they show up as
/// `exporter_authenticated 0`.
pub async fn metrics(State(s): State<Arc<AppState>>) -> Response {
    if let Some(ref device) = s.device {
        telemetry::collect(&s.session, device, &s.exporter).await;
    }
    let record = s.session.store().get();
    s.exporter.observe_session(record.as_ref(), s.session.stats());

    match s.exporter.render() {
        Ok(body) => (StatusCode::OK, [(CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::error!(err = %e, "failed to render metrics");
            ApiError::new(ErrorCode::Internal, "failed to render metrics").into_response()
        }
    }
}

/// `GET /api/v1/token/status`
pub async fn token_status(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let record = s.session.store().get();
    let pending_logins = s.flow.pending();
    let stats = s.session.stats();

    Json(TokenStatus {
        state: SessionState::resolve(record.as_ref(), pending_logins),
        has_access_token: record.is_some(),
        has_refresh_token: record.as_ref().is_some_and(|r| r.refresh_token.is_some()),
        expires_in_secs: record.as_ref().map(|r| r.expires_in().as_secs()),
        scope: record.as_ref().map(|r| r.scope_string()),
        pending_logins,
        last_refresh_at: stats.last_refresh_at_ms(),
        last_error: stats.last_error(),
    })
}

/// `POST /oauth/refresh`: refresh now, whatever the expiry.
pub async fn refresh(
    State(s): State<Arc<AppState>>,
) -> Result<Json<RefreshResponse>, ApiError> {
    s.session.refresh_now().await?;
    Ok(Json(RefreshResponse { refreshed: true }))
}

/// `GET /success`
pub async fn success_page() -> Html<String> {
    page("Login successful", "The exporter is now authorized to read your devices.")
}

/// `GET /fail?error=`
pub async fn fail_page(Query(params): Query<FailParams>) -> Html<String> {
    let reason = match params.error.as_deref() {
        Some("invalid_state") => "The login link expired or was already used.",
        Some("vendor_denied") => "Access was denied at the vendor login page.",
        Some("token_exchange_failed") => "The authorization code could not be exchanged.",
        _ => "The login did not complete.",
    };
    page("Login failed", reason)
}

fn page(title: &str, message: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html><head><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{message}</p>\
         <p><a href=\"/oauth/login\">Log in again</a></p></body></html>\n"
    ))
}
