// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test helpers: a scripted fake of the vendor token and features endpoints.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Assert that an expression returns `Err` whose message contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}

/// Sample features payload served by [`MockVendor`] by default.
pub const SAMPLE_FEATURES: &str = r#"{
  "data": [
    {
      "feature": "heating.sensors.temperature.outside",
      "properties": {
        "value": { "type": "number", "value": 5.5, "unit": "celsius" },
        "status": { "type": "string", "value": "connected" }
      }
    },
    {
      "feature": "heating.burners.0",
      "properties": {
        "active": { "type": "boolean", "value": true }
      }
    }
  ]
}"#;

struct MockState {
    token_calls: AtomicU32,
    exchange_calls: AtomicU32,
    refresh_calls: AtomicU32,
    feature_calls: AtomicU32,
    issued: AtomicU32,
    expires_in: AtomicU64,
    refresh_delay: Mutex<Duration>,
    token_script: Mutex<VecDeque<(u16, String)>>,
    feature_script: Mutex<VecDeque<(u16, String)>>,
    token_requests: Mutex<Vec<HashMap<String, String>>>,
    used_codes: Mutex<HashSet<String>>,
    last_bearer: Mutex<Option<String>>,
}

/// A fake vendor API on `127.0.0.1:<random>`.
///
/// Without scripted responses the token endpoint behaves like a real server:
/// codes are single-use, refresh tokens rotate on every refresh.
pub struct MockVendor {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown: CancellationToken,
}

impl MockVendor {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            token_calls: AtomicU32::new(0),
            exchange_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            feature_calls: AtomicU32::new(0),
            issued: AtomicU32::new(0),
            expires_in: AtomicU64::new(3600),
            refresh_delay: Mutex::new(Duration::ZERO),
            token_script: Mutex::new(VecDeque::new()),
            feature_script: Mutex::new(VecDeque::new()),
            token_requests: Mutex::new(Vec::new()),
            used_codes: Mutex::new(HashSet::new()),
            last_bearer: Mutex::new(None),
        });

        let app = Router::new()
            .route("/token", post(token_endpoint))
            .route(
                "/features/installations/{inst}/gateways/{gw}/devices/{dev}/features",
                get(features_endpoint),
            )
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let sd = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app).with_graceful_shutdown(sd.cancelled_owned()).await.ok();
        });

        Ok(Self { addr, state, shutdown })
    }

    pub fn authorize_url(&self) -> String {
        format!("http://{}/authorize", self.addr)
    }

    pub fn token_url(&self) -> String {
        format!("http://{}/token", self.addr)
    }

    pub fn api_base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue a canned token endpoint response (used before default behavior).
    pub fn push_token_response(&self, status: u16, body: impl Into<String>) {
        self.state.token_script.lock().push_back((status, body.into()));
    }

    /// Queue a canned features endpoint response.
    pub fn push_features_response(&self, status: u16, body: impl Into<String>) {
        self.state.feature_script.lock().push_back((status, body.into()));
    }

    /// Lifetime reported for tokens issued by the default behavior.
    pub fn set_expires_in(&self, secs: u64) {
        self.state.expires_in.store(secs, Ordering::Relaxed);
    }

    /// Delay applied to refresh responses (widens race windows in tests).
    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.lock() = delay;
    }

    pub fn token_calls(&self) -> u32 {
        self.state.token_calls.load(Ordering::Relaxed)
    }

    pub fn exchange_calls(&self) -> u32 {
        self.state.exchange_calls.load(Ordering::Relaxed)
    }

    pub fn refresh_calls(&self) -> u32 {
        self.state.refresh_calls.load(Ordering::Relaxed)
    }

    pub fn feature_calls(&self) -> u32 {
        self.state.feature_calls.load(Ordering::Relaxed)
    }

    /// Form bodies received by the token endpoint, in arrival order.
    pub fn token_requests(&self) -> Vec<HashMap<String, String>> {
        self.state.token_requests.lock().clone()
    }

    /// Bearer token presented on the last features request.
    pub fn last_bearer(&self) -> Option<String> {
        self.state.last_bearer.lock().clone()
    }
}

impl Drop for MockVendor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn token_endpoint(
    State(state): State<Arc<MockState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_calls.fetch_add(1, Ordering::Relaxed);
    state.token_requests.lock().push(form.clone());

    let grant = form.get("grant_type").map(String::as_str).unwrap_or_default();
    match grant {
        "authorization_code" => {
            state.exchange_calls.fetch_add(1, Ordering::Relaxed);
        }
        "refresh_token" => {
            state.refresh_calls.fetch_add(1, Ordering::Relaxed);
            let delay = *state.refresh_delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        _ => {}
    }

    let scripted = state.token_script.lock().pop_front();
    if let Some((status, body)) = scripted {
        return reply(status, body);
    }

    if grant == "authorization_code" {
        let code = form.get("code").cloned().unwrap_or_default();
        if !state.used_codes.lock().insert(code) {
            return reply(
                400,
                serde_json::json!({
                    "error": "invalid_grant",
                    "error_description": "authorization code already used"
                })
                .to_string(),
            );
        }
    }

    let n = state.issued.fetch_add(1, Ordering::Relaxed) + 1;
    let body = serde_json::json!({
        "access_token": format!("access-{n}"),
        "refresh_token": format!("refresh-{n}"),
        "expires_in": state.expires_in.load(Ordering::Relaxed),
        "scope": "IoT User offline_access",
        "token_type": "Bearer",
    });
    reply(200, body.to_string())
}

async fn features_endpoint(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.feature_calls.fetch_add(1, Ordering::Relaxed);
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);
    *state.last_bearer.lock() = bearer;

    let scripted = state.feature_script.lock().pop_front();
    match scripted {
        Some((status, body)) => reply(status, body),
        None => reply(200, SAMPLE_FEATURES.to_owned()),
    }
}

fn reply(status: u16, body: String) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [("content-type", "application/json")], body).into_response()
}

/// HTTP client for tests: short timeout, crypto provider installed.
pub fn test_http_client() -> reqwest::Client {
    crate::install_crypto_provider();
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_default()
}
