// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::credential::refresh::RefreshPolicy;

pub const DEFAULT_AUTHORIZE_URL: &str =
    "https://iam.viessmann-climatesolutions.com/idp/v3/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://iam.viessmann-climatesolutions.com/idp/v3/token";
pub const DEFAULT_API_BASE_URL: &str = "https://api.viessmann-climatesolutions.com/iot/v2";

/// Prometheus exporter for Viessmann heating devices.
#[derive(Debug, Clone, Parser)]
#[command(name = "viessmann-exporter", version, about)]
pub struct Config {
    /// OAuth client id registered with the vendor.
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: String,

    /// OAuth client secret.
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Redirect URI registered for the client; must route to /oauth/callback.
    #[arg(long, env = "REDIRECT_URI")]
    pub redirect_uri: String,

    /// Host address to bind to.
    #[arg(long, env = "LISTEN_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "LISTEN_PORT", default_value_t = 9000)]
    pub port: u16,

    #[arg(long, env = "AUTHORIZE_URL", default_value = DEFAULT_AUTHORIZE_URL)]
    pub authorize_url: String,

    #[arg(long, env = "TOKEN_URL", default_value = DEFAULT_TOKEN_URL)]
    pub token_url: String,

    /// Base URL of the device API.
    #[arg(long, env = "API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,

    /// Space-separated OAuth scopes requested at login.
    #[arg(long, env = "SCOPE", default_value = "IoT User offline_access")]
    pub scope: String,

    #[arg(long, env = "INSTALLATION_ID")]
    pub installation_id: Option<String>,

    #[arg(long, env = "GATEWAY_SERIAL")]
    pub gateway_serial: Option<String>,

    #[arg(long, env = "DEVICE_ID")]
    pub device_id: Option<String>,

    /// Seconds between refresh scheduler cycles.
    #[arg(long, env = "REFRESH_INTERVAL_SECS", default_value_t = 30)]
    pub refresh_interval_secs: u64,

    /// Refresh once the access token expires within this many seconds.
    #[arg(long, env = "REFRESH_MARGIN_SECS", default_value_t = 60)]
    pub refresh_margin_secs: u64,

    /// Refresh attempts per scheduler cycle.
    #[arg(long, env = "REFRESH_MAX_ATTEMPTS", default_value_t = 5)]
    pub refresh_max_attempts: u32,

    /// Seconds a started login stays redeemable.
    #[arg(long, env = "LOGIN_TTL_SECS", default_value_t = 600)]
    pub login_ttl_secs: u64,

    /// Timeout for every outbound vendor request.
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 20)]
    pub http_timeout_secs: u64,

    /// Persist tokens to this file across restarts.
    #[arg(long, env = "TOKEN_STORE")]
    pub token_store: Option<PathBuf>,

    /// Base64 32-byte key sealing the token store.
    #[arg(long, env = "TOKEN_STORE_KEY", hide_env_values = true)]
    pub token_store_key: Option<String>,

    /// Bearer token for /metrics and the JSON API. If unset, auth is disabled.
    #[arg(long, env = "METRICS_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Log format (json or text).
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level filter.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Identifies the one device whose features are exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRef {
    pub installation_id: String,
    pub gateway_serial: String,
    pub device_id: String,
}

impl Config {
    /// Validate invariants clap cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("CLIENT_ID", &self.client_id),
            ("CLIENT_SECRET", &self.client_secret),
            ("REDIRECT_URI", &self.redirect_uri),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{name} must not be empty");
            }
        }

        check_http_url("REDIRECT_URI", &self.redirect_uri)?;
        check_http_url("AUTHORIZE_URL", &self.authorize_url)?;
        check_http_url("TOKEN_URL", &self.token_url)?;
        check_http_url("API_BASE_URL", &self.api_base_url)?;

        if self.refresh_interval_secs == 0 {
            anyhow::bail!("REFRESH_INTERVAL_SECS must be greater than zero");
        }
        if self.refresh_max_attempts == 0 {
            anyhow::bail!("REFRESH_MAX_ATTEMPTS must be greater than zero");
        }
        if self.login_ttl_secs == 0 {
            anyhow::bail!("LOGIN_TTL_SECS must be greater than zero");
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("HTTP_TIMEOUT_SECS must be greater than zero");
        }

        if self.token_store.is_some() && self.token_store_key.is_none() {
            anyhow::bail!("TOKEN_STORE requires TOKEN_STORE_KEY");
        }

        let device_parts = [&self.installation_id, &self.gateway_serial, &self.device_id];
        let set = device_parts.iter().filter(|p| p.is_some()).count();
        if set != 0 && set != device_parts.len() {
            anyhow::bail!("INSTALLATION_ID, GATEWAY_SERIAL and DEVICE_ID must be set together");
        }

        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }

        Ok(())
    }

    /// The device to poll, if fully configured.
    pub fn device(&self) -> Option<DeviceRef> {
        Some(DeviceRef {
            installation_id: self.installation_id.clone()?,
            gateway_serial: self.gateway_serial.clone()?,
            device_id: self.device_id.clone()?,
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn login_ttl(&self) -> Duration {
        Duration::from_secs(self.login_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            margin: Duration::from_secs(self.refresh_margin_secs),
            max_attempts: self.refresh_max_attempts,
            ..RefreshPolicy::default()
        }
    }
}

fn check_http_url(name: &str, value: &str) -> anyhow::Result<()> {
    let url = Url::parse(value).map_err(|e| anyhow::anyhow!("{name} is not an absolute URL: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("{name} must use http or https, got {}", url.scheme());
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
