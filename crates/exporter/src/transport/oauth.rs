// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser-facing OAuth routes.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::LOCATION;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::credential::flow::CallbackParams;
use crate::state::AppState;

fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_owned())]).into_response()
}

/// `GET /oauth/login`: redirect to the vendor authorization page.
pub async fn login(State(s): State<Arc<AppState>>) -> Response {
    let url = s.flow.begin_login();
    redirect(url.as_str())
}

/// `GET /oauth/callback`: redeem the code, then land on a result page.
pub async fn callback(
    State(s): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    match s.flow.handle_callback(params).await {
        Ok(_) => redirect("/success"),
        Err(e) => redirect(&format!("/fail?error={}", e.as_str())),
    }
}
