// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the exporter.

pub mod auth;
pub mod http;
pub mod oauth;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all exporter routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Open routes
        .route("/health", get(http::health))
        .route("/oauth/login", get(oauth::login))
        .route("/oauth/callback", get(oauth::callback))
        .route("/success", get(http::success_page))
        .route("/fail", get(http::fail_page))
        // Scrape and session management
        .route("/metrics", get(http::metrics))
        .route("/oauth/refresh", post(http::refresh))
        .route("/api/v1/token/status", get(http::token_status))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
