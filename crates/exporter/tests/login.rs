// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end browser login against a mock vendor.

mod support;

use axum::http::StatusCode;

use viessmann_exporter::credential::pkce::compute_code_challenge;
use viessmann_exporter::test_support::MockVendor;

use support::{app, login, start_login, with_device};

#[tokio::test]
async fn login_callback_success_then_authenticated_metrics() -> anyhow::Result<()> {
    let vendor = MockVendor::start().await?;
    let (_state, server) = app(&vendor, with_device())?;

    // Before login the scrape still succeeds.
    let resp = server.get("/metrics").await;
    resp.assert_status_ok();
    assert!(resp.text().contains("exporter_authenticated 0"));
    assert_eq!(vendor.feature_calls(), 0);

    let params = start_login(&server).await?;
    assert_eq!(params["client_id"], "client-123");
    assert_eq!(params["redirect_uri"], "http://localhost:9000/oauth/callback");
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["scope"], "IoT User offline_access");
    assert_eq!(params["code_challenge_method"], "S256");

    let resp =
        server.get(&format!("/oauth/callback?code=abc&state={}", params["state"])).await;
    resp.assert_status(StatusCode::FOUND);
    assert_eq!(resp.header("location").to_str()?, "/success");

    // The verifier sent on exchange hashes to the challenge from the login URL.
    let exchange = &vendor.token_requests()[0];
    assert_eq!(exchange["grant_type"], "authorization_code");
    assert_eq!(exchange["client_secret"], "s3cret");
    assert_eq!(compute_code_challenge(&exchange["code_verifier"]), params["code_challenge"]);

    let resp = server.get("/success").await;
    resp.assert_status_ok();
    assert!(resp.text().contains("Login successful"));

    let resp = server.get("/metrics").await;
    resp.assert_status_ok();
    let text = resp.text();
    assert!(text.contains("exporter_authenticated 1"), "{text}");
    assert!(
        text.contains(
            r#"viessmann_feature_value{feature="heating.sensors.temperature.outside",property="value"} 5.5"#
        ),
        "{text}"
    );
    assert!(text.contains(r#"viessmann_api_requests_total{result="success"} 1"#), "{text}");
    assert!(text.contains(r#"viessmann_auth_requests_total{result="success",type="exchange"} 1"#));
    assert_eq!(vendor.last_bearer().as_deref(), Some("access-1"));
    Ok(())
}

#[tokio::test]
async fn metrics_content_type_is_prometheus_text() -> anyhow::Result<()> {
    let vendor = MockVendor::start().await?;
    let (_state, server) = app(&vendor, &[])?;
    let resp = server.get("/metrics").await;
    resp.assert_status_ok();
    assert_eq!(resp.header("content-type").to_str()?, "text/plain; version=0.0.4; charset=utf-8");
    Ok(())
}

#[tokio::test]
async fn replayed_callback_fails_with_invalid_state() -> anyhow::Result<()> {
    let vendor = MockVendor::start().await?;
    let (state, server) = app(&vendor, &[])?;

    let params = start_login(&server).await?;
    let callback = format!("/oauth/callback?code=abc&state={}", params["state"]);
    server.get(&callback).await.assert_status(StatusCode::FOUND);
    let first = state.session.store().get().expect("record");

    let resp = server.get(&callback).await;
    assert_eq!(resp.header("location").to_str()?, "/fail?error=invalid_state");
    assert_eq!(vendor.exchange_calls(), 1);
    assert_eq!(state.session.store().get().expect("record").generation, first.generation);
    Ok(())
}

#[tokio::test]
async fn replayed_code_on_new_login_keeps_session() -> anyhow::Result<()> {
    let vendor = MockVendor::start().await?;
    let (state, server) = app(&vendor, &[])?;

    assert_eq!(login(&server, "abc").await?, "/success");
    let before = state.session.store().get().expect("record");

    assert_eq!(login(&server, "abc").await?, "/fail?error=token_exchange_failed");
    let after = state.session.store().get().expect("record");
    assert_eq!(after.access_token, before.access_token);
    assert_eq!(after.generation, before.generation);
    Ok(())
}

#[tokio::test]
async fn denied_consent_redirects_to_fail() -> anyhow::Result<()> {
    let vendor = MockVendor::start().await?;
    let (state, server) = app(&vendor, &[])?;

    let params = start_login(&server).await?;
    let resp = server
        .get(&format!(
            "/oauth/callback?error=access_denied&error_description=declined&state={}",
            params["state"]
        ))
        .await;
    assert_eq!(resp.header("location").to_str()?, "/fail?error=vendor_denied");
    assert_eq!(vendor.token_calls(), 0);
    assert!(state.session.store().get().is_none());

    let resp = server.get("/fail?error=vendor_denied").await;
    resp.assert_status_ok();
    assert!(resp.text().contains("Access was denied"));
    Ok(())
}

#[tokio::test]
async fn forged_state_redirects_to_fail() -> anyhow::Result<()> {
    let vendor = MockVendor::start().await?;
    let (_state, server) = app(&vendor, &[])?;

    let resp = server.get("/oauth/callback?code=abc&state=forged").await;
    assert_eq!(resp.header("location").to_str()?, "/fail?error=invalid_state");
    let resp = server.get("/oauth/callback?code=abc").await;
    assert_eq!(resp.header("location").to_str()?, "/fail?error=invalid_state");
    assert_eq!(vendor.token_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn vendor_401_flags_token_for_refresh() -> anyhow::Result<()> {
    let vendor = MockVendor::start().await?;
    let (state, server) = app(&vendor, with_device())?;
    assert_eq!(login(&server, "abc").await?, "/success");
    let generation = state.session.store().get().expect("record").generation;

    vendor.push_features_response(401, "");
    let resp = server.get("/metrics").await;
    resp.assert_status_ok();
    let text = resp.text();
    assert!(text.contains(r#"viessmann_api_requests_total{result="unauthorized"} 1"#), "{text}");
    assert_eq!(state.session.needs_refresh(), Some(generation));
    Ok(())
}
