// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token endpoint client: authorization code exchange and refresh.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::credential::AuthError;

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// OAuth error response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenErrorResponse {
    fn describe(&self) -> String {
        match self.error_description {
            Some(ref desc) if !desc.is_empty() => format!("{}: {desc}", self.error),
            _ => self.error.clone(),
        }
    }
}

/// Client credentials and endpoint for the vendor token endpoint.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: String,
}

impl TokenClient {
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.filter(|s| !s.is_empty()),
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Exchange an authorization code (plus PKCE verifier) for tokens.
    ///
    /// Any failure is terminal: the code is single-use and already spent.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AuthError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code", code),
            ("code_verifier", code_verifier),
        ];
        if let Some(ref secret) = self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let resp = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(format!("HTTP error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(format!("read body: {e}")))?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => err.describe(),
                Err(_) => format!("HTTP {status}"),
            };
            return Err(AuthError::TokenExchangeFailed(detail));
        }

        serde_json::from_str(&body)
            .map_err(|e| AuthError::TokenExchangeFailed(format!("parse token response: {e}")))
    }

    /// Perform a single `grant_type=refresh_token` request.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        if let Some(ref secret) = self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let resp = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::RefreshTransient(format!("HTTP error: {e}")))?;

        let status = resp.status();
        let body =
            resp.text().await.map_err(|e| AuthError::RefreshTransient(format!("read body: {e}")))?;

        if !status.is_success() {
            return Err(classify_refresh_failure(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| AuthError::RefreshTransient(format!("parse response: {e}")))
    }
}

/// Decide whether a failed refresh is worth retrying.
///
/// `invalid_grant` and plain 400/401 responses mean the refresh token itself
/// was rejected. Rate limiting and server errors are transient.
pub fn classify_refresh_failure(status: StatusCode, body: &str) -> AuthError {
    let parsed = serde_json::from_str::<TokenErrorResponse>(body).ok();
    if let Some(ref err) = parsed {
        if err.error == "invalid_grant" {
            return AuthError::RefreshFatal(err.describe());
        }
    }

    let detail = parsed.map(|e| e.describe()).unwrap_or_else(|| format!("HTTP {status}"));
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => AuthError::RefreshFatal(detail),
        _ => AuthError::RefreshTransient(detail),
    }
}

#[cfg(test)]
#[path = "oauth_tests.rs"]
mod tests;
