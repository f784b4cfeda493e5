// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prometheus registry backing `/metrics`.

use std::time::Duration;

use prometheus::{Encoder, Gauge, GaugeVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::credential::{AuthStats, TokenRecord};
use crate::telemetry::FeaturesResponse;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub struct Exporter {
    registry: Registry,
    feature_value: GaugeVec,
    api_requests: IntCounterVec,
    api_request_duration: Gauge,
    auth_requests: IntCounterVec,
    auth_request_duration: GaugeVec,
    token_expires_in: IntGauge,
    authenticated: IntGauge,
}

impl Exporter {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let feature_value = GaugeVec::new(
            Opts::new("viessmann_feature_value", "Numeric feature property reported by the device"),
            &["feature", "property"],
        )?;
        let api_requests = IntCounterVec::new(
            Opts::new("viessmann_api_requests_total", "Device API requests by result"),
            &["result"],
        )?;
        let api_request_duration = Gauge::new(
            "viessmann_api_request_duration_seconds",
            "Duration of the last device API request",
        )?;
        let auth_requests = IntCounterVec::new(
            Opts::new("viessmann_auth_requests_total", "Token endpoint requests by type and result"),
            &["type", "result"],
        )?;
        let auth_request_duration = GaugeVec::new(
            Opts::new(
                "viessmann_auth_request_duration_seconds",
                "Duration of the last token endpoint request by type",
            ),
            &["type"],
        )?;
        let token_expires_in = IntGauge::new(
            "exporter_token_expires_in_seconds",
            "Seconds until the current access token expires",
        )?;
        let authenticated =
            IntGauge::new("exporter_authenticated", "1 if a non-expired access token is held")?;

        registry.register(Box::new(feature_value.clone()))?;
        registry.register(Box::new(api_requests.clone()))?;
        registry.register(Box::new(api_request_duration.clone()))?;
        registry.register(Box::new(auth_requests.clone()))?;
        registry.register(Box::new(auth_request_duration.clone()))?;
        registry.register(Box::new(token_expires_in.clone()))?;
        registry.register(Box::new(authenticated.clone()))?;

        Ok(Self {
            registry,
            feature_value,
            api_requests,
            api_request_duration,
            auth_requests,
            auth_request_duration,
            token_expires_in,
            authenticated,
        })
    }

    /// Replace all feature gauges with the given snapshot. Returns how many
    /// properties were exported.
    pub fn record_features(&self, features: &FeaturesResponse) -> usize {
        self.feature_value.reset();
        let mut exported = 0;
        for feature in &features.data {
            for (name, property) in &feature.properties {
                if let Some(value) = property.numeric() {
                    self.feature_value
                        .with_label_values(&[feature.feature.as_str(), name.as_str()])
                        .set(value);
                    exported += 1;
                }
            }
        }
        exported
    }

    /// Drop every feature gauge so a failed fetch never serves old readings.
    pub fn clear_features(&self) {
        self.feature_value.reset();
    }

    pub fn record_api_request(&self, result: &str, elapsed: Duration) {
        self.api_requests.with_label_values(&[result]).inc();
        self.api_request_duration.set(elapsed.as_secs_f64());
    }

    /// Sync session gauges and auth counters with the current state.
    pub fn observe_session(&self, record: Option<&TokenRecord>, stats: &AuthStats) {
        match record {
            Some(r) if !r.is_expired() => {
                self.authenticated.set(1);
                self.token_expires_in.set(r.expires_in().as_secs() as i64);
            }
            _ => {
                self.authenticated.set(0);
                self.token_expires_in.set(0);
            }
        }

        use std::sync::atomic::Ordering::Relaxed;
        for (kind, result, total) in [
            ("exchange", "success", stats.exchanges_ok.load(Relaxed)),
            ("exchange", "failure", stats.exchanges_failed.load(Relaxed)),
            ("refresh", "success", stats.refreshes_ok.load(Relaxed)),
            ("refresh", "failure", stats.refreshes_failed.load(Relaxed)),
        ] {
            let counter = self.auth_requests.with_label_values(&[kind, result]);
            counter.inc_by(total.saturating_sub(counter.get()));
        }

        for (kind, elapsed) in [
            ("exchange", stats.last_exchange_duration()),
            ("refresh", stats.last_refresh_duration()),
        ] {
            if let Some(elapsed) = elapsed {
                self.auth_request_duration.with_label_values(&[kind]).set(elapsed.as_secs_f64());
            }
        }
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
