// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared setup for router tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum_test::TestServer;
use clap::Parser;
use url::Url;

use viessmann_exporter::config::Config;
use viessmann_exporter::state::AppState;
use viessmann_exporter::test_support::MockVendor;
use viessmann_exporter::transport::build_router;

pub const METRICS_TOKEN: &str = "scrape-secret";

pub fn config(vendor: &MockVendor, extra: &[&str]) -> Config {
    let authorize_url = vendor.authorize_url();
    let token_url = vendor.token_url();
    let api_base_url = vendor.api_base_url();
    let mut args = vec![
        "viessmann-exporter",
        "--client-id",
        "client-123",
        "--client-secret",
        "s3cret",
        "--redirect-uri",
        "http://localhost:9000/oauth/callback",
        "--authorize-url",
        &authorize_url,
        "--token-url",
        &token_url,
        "--api-base-url",
        &api_base_url,
        "--http-timeout-secs",
        "5",
    ];
    args.extend_from_slice(extra);
    Config::parse_from(args)
}

pub fn with_device() -> &'static [&'static str] {
    &["--installation-id", "123", "--gateway-serial", "7571", "--device-id", "0"]
}

pub fn app(vendor: &MockVendor, extra: &[&str]) -> anyhow::Result<(Arc<AppState>, TestServer)> {
    let config = config(vendor, extra);
    config.validate()?;
    let state = Arc::new(AppState::new(config)?);
    let server = TestServer::new(build_router(Arc::clone(&state)))
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok((state, server))
}

pub fn query(location: &str) -> anyhow::Result<HashMap<String, String>> {
    let url = Url::parse(location)?;
    Ok(url.query_pairs().into_owned().collect())
}

/// Start a login through the router and return the vendor URL parameters.
pub async fn start_login(server: &TestServer) -> anyhow::Result<HashMap<String, String>> {
    let resp = server.get("/oauth/login").await;
    resp.assert_status(axum::http::StatusCode::FOUND);
    let location = resp.header("location");
    query(location.to_str()?)
}

/// Complete a login end to end. Returns the callback redirect target.
pub async fn login(server: &TestServer, code: &str) -> anyhow::Result<String> {
    let params = start_login(server).await?;
    let resp = server.get(&format!("/oauth/callback?code={code}&state={}", params["state"])).await;
    resp.assert_status(axum::http::StatusCode::FOUND);
    Ok(resp.header("location").to_str()?.to_owned())
}
