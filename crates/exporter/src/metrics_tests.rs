// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use super::*;
use crate::credential::AuthError;
use crate::test_support::SAMPLE_FEATURES;

fn record(lifetime: Duration) -> TokenRecord {
    TokenRecord {
        access_token: "a".to_owned(),
        refresh_token: Some("r".to_owned()),
        expires_at: Instant::now() + lifetime,
        scope: BTreeSet::new(),
        generation: 1,
    }
}

#[test]
fn unauthenticated_session_reports_zero() -> anyhow::Result<()> {
    let exporter = Exporter::new()?;
    exporter.observe_session(None, &AuthStats::default());
    let text = exporter.render()?;
    assert!(text.contains("exporter_authenticated 0"), "{text}");
    assert!(text.contains("exporter_token_expires_in_seconds 0"), "{text}");
    Ok(())
}

#[test]
fn expired_record_is_not_authenticated() -> anyhow::Result<()> {
    let exporter = Exporter::new()?;
    exporter.observe_session(Some(&record(Duration::ZERO)), &AuthStats::default());
    assert!(exporter.render()?.contains("exporter_authenticated 0"));
    Ok(())
}

#[test]
fn live_record_reports_expiry() -> anyhow::Result<()> {
    let exporter = Exporter::new()?;
    exporter.observe_session(Some(&record(Duration::from_secs(3600))), &AuthStats::default());
    let text = exporter.render()?;
    assert!(text.contains("exporter_authenticated 1"), "{text}");
    assert!(text.contains("exporter_token_expires_in_seconds 359"), "{text}");
    Ok(())
}

#[test]
fn auth_counters_follow_stats() -> anyhow::Result<()> {
    let exporter = Exporter::new()?;
    let stats = AuthStats::default();
    stats.exchange_succeeded();
    stats.refresh_succeeded();
    stats.refresh_succeeded();
    stats.refresh_failed(&AuthError::RefreshTransient("503".to_owned()));

    exporter.observe_session(None, &stats);
    // Observing twice must not double count.
    exporter.observe_session(None, &stats);

    let text = exporter.render()?;
    assert!(text.contains(r#"viessmann_auth_requests_total{result="success",type="exchange"} 1"#), "{text}");
    assert!(text.contains(r#"viessmann_auth_requests_total{result="success",type="refresh"} 2"#), "{text}");
    assert!(text.contains(r#"viessmann_auth_requests_total{result="failure",type="refresh"} 1"#), "{text}");
    Ok(())
}

#[test]
fn numeric_and_boolean_properties_are_exported() -> anyhow::Result<()> {
    let exporter = Exporter::new()?;
    let features: FeaturesResponse = serde_json::from_str(SAMPLE_FEATURES)?;
    assert_eq!(exporter.record_features(&features), 2);

    let text = exporter.render()?;
    assert!(
        text.contains(
            r#"viessmann_feature_value{feature="heating.sensors.temperature.outside",property="value"} 5.5"#
        ),
        "{text}"
    );
    assert!(
        text.contains(r#"viessmann_feature_value{feature="heating.burners.0",property="active"} 1"#),
        "{text}"
    );
    assert!(!text.contains(r#"property="status""#), "string values are skipped: {text}");
    Ok(())
}

#[test]
fn vanished_features_are_dropped() -> anyhow::Result<()> {
    let exporter = Exporter::new()?;
    exporter.record_features(&serde_json::from_str(SAMPLE_FEATURES)?);
    exporter.record_features(&FeaturesResponse::default());
    assert!(!exporter.render()?.contains("viessmann_feature_value{"));
    Ok(())
}

#[test]
fn api_requests_are_counted_by_result() -> anyhow::Result<()> {
    let exporter = Exporter::new()?;
    exporter.record_api_request("success", Duration::from_millis(120));
    exporter.record_api_request("success", Duration::from_millis(120));
    exporter.record_api_request("unauthorized", Duration::from_millis(250));
    let text = exporter.render()?;
    assert!(text.contains(r#"viessmann_api_requests_total{result="success"} 2"#), "{text}");
    assert!(text.contains(r#"viessmann_api_requests_total{result="unauthorized"} 1"#), "{text}");
    assert!(text.contains("viessmann_api_request_duration_seconds 0.25"), "{text}");
    Ok(())
}

#[test]
fn clear_features_drops_every_series() -> anyhow::Result<()> {
    let exporter = Exporter::new()?;
    exporter.record_features(&serde_json::from_str(SAMPLE_FEATURES)?);
    exporter.clear_features();
    assert!(!exporter.render()?.contains("viessmann_feature_value{"));
    Ok(())
}

#[test]
fn auth_durations_follow_stats() -> anyhow::Result<()> {
    let exporter = Exporter::new()?;
    let stats = AuthStats::default();
    exporter.observe_session(None, &stats);
    assert!(!exporter.render()?.contains("viessmann_auth_request_duration_seconds{"));

    stats.exchange_took(Duration::from_millis(500));
    stats.refresh_took(Duration::from_millis(1500));
    exporter.observe_session(None, &stats);

    let text = exporter.render()?;
    assert!(text.contains(r#"viessmann_auth_request_duration_seconds{type="exchange"} 0.5"#), "{text}");
    assert!(text.contains(r#"viessmann_auth_request_duration_seconds{type="refresh"} 1.5"#), "{text}");
    Ok(())
}
