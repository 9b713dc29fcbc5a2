//! Access token acquisition for Azure Resource Manager.
//!
//! Only the service principal (client secret) flow is implemented. Tokens are
//! cached until shortly before they expire.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::azure::error::{ApimError, ApimResult};
use crate::config::AzureSettings;

/// Tokens are refreshed this long before Azure considers them expired.
const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// Source of bearer tokens for ARM requests.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Returns a valid bearer token.
    async fn token(&self) -> ApimResult<String>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

impl CachedToken {
    fn new(value: String, expires_in: Duration, now: Instant) -> Self {
        Self {
            value,
            refresh_at: now + expires_in.saturating_sub(EXPIRY_MARGIN),
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.refresh_at
    }
}

/// OAuth2 client-credentials flow against Entra ID.
pub struct ClientSecretCredential {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cache: Mutex<Option<CachedToken>>,
}

impl ClientSecretCredential {
    /// Creates a credential for the tenant and service principal in `settings`.
    #[must_use]
    pub fn new(http: reqwest::Client, settings: &AzureSettings) -> Self {
        Self {
            http,
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                settings.authority_host, settings.tenant_id
            ),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            scope: format!("{}/.default", settings.management_endpoint),
            cache: Mutex::new(None),
        }
    }

    async fn request_token(&self) -> ApimResult<TokenResponse> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ApimError::authentication(format!("token request failed: {e}")))?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<TokenErrorResponse>(&body).map_or_else(
                |_| format!("token endpoint returned HTTP {}", status.as_u16()),
                |e| match e.error_description {
                    Some(description) => format!("{}: {description}", e.error),
                    None => e.error,
                },
            );
            return Err(ApimError::authentication(message));
        }

        serde_json::from_str(&body)
            .map_err(|e| ApimError::authentication(format!("malformed token response: {e}")))
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn token(&self) -> ApimResult<String> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(cached.value.clone());
        }

        tracing::debug!("Requesting new ARM access token");
        let response = self.request_token().await?;
        let token = CachedToken::new(
            response.access_token,
            Duration::from_secs(response.expires_in),
            Instant::now(),
        );
        let value = token.value.clone();
        *cache = Some(token);

        Ok(value)
    }
}
