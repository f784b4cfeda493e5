// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the vendor device API.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::DeviceRef;
use crate::credential::session::Session;
use crate::metrics::Exporter;

/// `GET .../features` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeaturesResponse {
    #[serde(default)]
    pub data: Vec<Feature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    pub feature: String,
    #[serde(default)]
    pub properties: BTreeMap<String, FeatureProperty>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureProperty {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub unit: Option<String>,
}

impl FeatureProperty {
    /// Numeric reading of this property, if it has one (booleans as 0/1).
    pub fn numeric(&self) -> Option<f64> {
        match self.value {
            serde_json::Value::Number(ref n) => n.as_f64(),
            serde_json::Value::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// 401: the bearer token was rejected.
    Unauthorized,
    Status(u16),
    Transport(String),
    Decode(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => f.write_str("access token rejected"),
            Self::Status(code) => write!(f, "device API returned HTTP {code}"),
            Self::Transport(msg) => write!(f, "device API unreachable: {msg}"),
            Self::Decode(msg) => write!(f, "malformed features payload: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Reads features of one device.
pub struct DeviceClient {
    client: Client,
    features_url: String,
}

impl DeviceClient {
    pub fn new(client: Client, api_base_url: &str, device: &DeviceRef) -> Self {
        let features_url = format!(
            "{}/features/installations/{}/gateways/{}/devices/{}/features",
            api_base_url.trim_end_matches('/'),
            device.installation_id,
            device.gateway_serial,
            device.device_id,
        );
        Self { client, features_url }
    }

    pub fn features_url(&self) -> &str {
        &self.features_url
    }

    pub async fn fetch_features(&self, token: &str) -> Result<FeaturesResponse, FetchError> {
        let resp = self
            .client
            .get(&self.features_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => return Err(FetchError::Unauthorized),
            s if !s.is_success() => return Err(FetchError::Status(s.as_u16())),
            _ => {}
        }

        let bytes = resp.bytes().await.map_err(|e| FetchError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

/// Fetch the device's features with a valid token and publish them.
///
/// Without a session nothing is fetched and old readings are dropped. A 401
/// flags the token so the refresh scheduler replaces it before the next
/// scrape.
pub async fn collect(session: &Session, device: &DeviceClient, exporter: &Exporter) {
    let Ok(token) = session.get_valid_token().await else {
        tracing::debug!("no valid token, skipping device fetch");
        exporter.clear_features();
        return;
    };

    let started = Instant::now();
    let result = device.fetch_features(&token).await;
    let elapsed = started.elapsed();
    match result {
        Ok(features) => {
            let exported = exporter.record_features(&features);
            exporter.record_api_request("success", elapsed);
            tracing::debug!(features = features.data.len(), exported, ?elapsed, "device features updated");
        }
        Err(FetchError::Unauthorized) => {
            exporter.clear_features();
            exporter.record_api_request("unauthorized", elapsed);
            tracing::warn!("device API rejected access token");
            session.invalidate(&token);
        }
        Err(e) => {
            exporter.clear_features();
            exporter.record_api_request("error", elapsed);
            tracing::warn!(err = %e, "device fetch failed");
        }
    }
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
