// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use anyhow::Context;
use url::Url;

use crate::config::Config;
use crate::credential::cipher::TokenCipher;
use crate::credential::flow::{AuthorizationFlow, LoginSettings};
use crate::credential::oauth::TokenClient;
use crate::credential::persist::TokenPersistence;
use crate::credential::session::Session;
use crate::credential::store::TokenStore;
use crate::credential::AuthStats;
use crate::metrics::Exporter;
use crate::telemetry::DeviceClient;

/// Shared exporter state.
pub struct AppState {
    pub config: Config,
    pub session: Arc<Session>,
    pub flow: Arc<AuthorizationFlow>,
    /// Present only when a device is configured.
    pub device: Option<DeviceClient>,
    pub exporter: Exporter,
    pub persistence: Option<Arc<TokenPersistence>>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        crate::install_crypto_provider();
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .context("failed to build HTTP client")?;

        let tokens = Arc::new(TokenClient::new(
            http.clone(),
            config.token_url.clone(),
            config.client_id.clone(),
            Some(config.client_secret.clone()),
            config.redirect_uri.clone(),
        ));
        let store = Arc::new(TokenStore::new());
        let stats = Arc::new(AuthStats::default());

        let session = Arc::new(Session::new(
            Arc::clone(&store),
            Arc::clone(&tokens),
            config.refresh_policy(),
            Arc::clone(&stats),
        ));
        let settings = LoginSettings {
            authorize_url: Url::parse(&config.authorize_url).context("invalid AUTHORIZE_URL")?,
            scope: config.scope.clone(),
            attempt_ttl: config.login_ttl(),
        };
        let flow = Arc::new(AuthorizationFlow::new(settings, tokens, store, stats));

        let device = config.device().map(|d| DeviceClient::new(http, &config.api_base_url, &d));

        let persistence = match (config.token_store.as_ref(), config.token_store_key.as_deref()) {
            (Some(path), Some(key)) => {
                Some(Arc::new(TokenPersistence::new(path, TokenCipher::from_base64(key)?)))
            }
            _ => None,
        };

        Ok(Self { config, session, flow, device, exporter: Exporter::new()?, persistence })
    }
}
