//! Short-lived GitHub App installation token management.
//!
//! Generates an RS256 JWT for GitHub App authentication and exchanges it
//! for a scoped installation access token via GitHub's REST API. Tokens are
//! cached and refreshed when within 5 minutes of expiry.
//!
//! Tokens are granted minimal permissions (`contents: write`,
//! `pull_requests: write`) — just enough for the agent to push code and
//! open pull requests. Failure at any step is non-fatal to the task: the
//! executor falls back to an anonymous clone.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::error::RunnerError;

/// GitHub App JWT lifetime: 10 minutes (GitHub's maximum).
const JWT_LIFETIME_SECONDS: i64 = 600;

/// Refresh installation tokens within this many seconds of expiry.
const REFRESH_MARGIN_SECONDS: i64 = 300;

/// GitHub API base URL.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// HTTP timeout for GitHub API calls; independent of the task timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Serialize)]
struct Claims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Manages short-lived GitHub App installation access tokens.
pub struct GitHubTokenManager {
    app_id: u64,
    private_key: String,
    installation_id: u64,
    base_url: String,
    client: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
}

impl GitHubTokenManager {
    pub fn new(app_id: u64, private_key: impl Into<String>, installation_id: u64) -> Self {
        Self::with_base_url(app_id, private_key, installation_id, GITHUB_API_URL)
    }

    /// Override the API base URL; tests point this at a mock server.
    pub fn with_base_url(
        app_id: u64,
        private_key: impl Into<String>,
        installation_id: u64,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            app_id,
            private_key: private_key.into(),
            installation_id,
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            cached: RwLock::new(None),
        }
    }

    /// Short-lived JWT for app authentication, issued 60 s in the past to
    /// absorb clock skew.
    fn generate_jwt(&self) -> Result<String, RunnerError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iat: now - 60,
            exp: now + JWT_LIFETIME_SECONDS,
            iss: self.app_id.to_string(),
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| RunnerError::TokenIssuance(format!("invalid private key: {e}")))?;
        let jwt = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| RunnerError::TokenIssuance(format!("jwt signing failed: {e}")))?;
        tracing::debug!(app_id = self.app_id, "github_tokens.jwt_generated");
        Ok(jwt)
    }

    /// True when the cached token will stay valid past the refresh margin.
    async fn is_token_valid(&self) -> bool {
        let cached = self.cached.read().await;
        cached.as_ref().is_some_and(|c| {
            Utc::now() < c.expires_at - ChronoDuration::seconds(REFRESH_MARGIN_SECONDS)
        })
    }

    async fn request_installation_token(&self) -> Result<CachedToken, RunnerError> {
        let app_jwt = self.generate_jwt()?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.base_url, self.installation_id
        );

        let response = self
            .client
            .post(&url)
            .timeout(HTTP_TIMEOUT)
            .header("Authorization", format!("Bearer {app_jwt}"))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", "lailatov-runner")
            .json(&json!({
                "permissions": {
                    "contents": "write",
                    "pull_requests": "write",
                }
            }))
            .send()
            .await
            .map_err(|e| RunnerError::TokenIssuance(format!("token exchange failed: {e}")))?;

        if !response.status().is_success() {
            return Err(RunnerError::TokenIssuance(format!(
                "token exchange returned {}",
                response.status()
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RunnerError::TokenIssuance(format!("invalid token response: {e}")))?;

        let token = data
            .get("token")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| RunnerError::TokenIssuance("response missing token".to_string()))?
            .to_string();
        let expires_at = data
            .get("expires_at")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| RunnerError::TokenIssuance("response missing expires_at".to_string()))?;

        tracing::info!(
            installation_id = self.installation_id,
            expires_at = %expires_at,
            "github_tokens.installation_token_created"
        );
        Ok(CachedToken { token, expires_at })
    }

    /// A valid installation token, refreshed when nearing expiry.
    pub async fn get_token(&self) -> Result<String, RunnerError> {
        if self.is_token_valid().await {
            tracing::debug!(installation_id = self.installation_id, "github_tokens.cache_hit");
            let cached = self.cached.read().await;
            if let Some(cached) = cached.as_ref() {
                return Ok(cached.token.clone());
            }
        }

        tracing::info!(installation_id = self.installation_id, "github_tokens.refreshing");
        let fresh = self.request_installation_token().await?;
        let token = fresh.token.clone();
        *self.cached.write().await = Some(fresh);
        Ok(token)
    }
}

/// Process-wide token issuer with a lazily constructed manager.
///
/// The app credential triple is read from the environment at call time;
/// [`TokenIssuer::reset`] drops the manager so tests can switch credentials
/// between cases.
#[derive(Clone, Default)]
pub struct TokenIssuer {
    manager: Arc<RwLock<Option<Arc<GitHubTokenManager>>>>,
}

impl TokenIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to obtain a short-lived push token via the configured GitHub App.
    ///
    /// Returns `None` when the app is not configured or any step fails; the
    /// caller proceeds with an anonymous clone.
    pub async fn issue(&self) -> Option<String> {
        let app_id = std::env::var("GITHUB_APP_ID").unwrap_or_default();
        let installation_id = std::env::var("GITHUB_APP_INSTALLATION_ID").unwrap_or_default();
        let private_key = std::env::var("GITHUB_APP_PRIVATE_KEY").unwrap_or_default();

        if app_id.is_empty() || installation_id.is_empty() || private_key.is_empty() {
            return None;
        }
        let (Ok(app_id), Ok(installation_id)) =
            (app_id.parse::<u64>(), installation_id.parse::<u64>())
        else {
            tracing::warn!("github_tokens.invalid_app_config");
            return None;
        };

        let manager = {
            let mut guard = self.manager.write().await;
            if guard.is_none() {
                *guard = Some(Arc::new(GitHubTokenManager::new(
                    app_id,
                    private_key,
                    installation_id,
                )));
            }
            guard.as_ref().cloned()
        }?;

        match manager.get_token().await {
            Ok(token) => {
                tracing::info!("task.github_app_token.acquired");
                Some(token)
            }
            Err(err) => {
                tracing::warn!(error = %err, "task.github_app_token.failed");
                None
            }
        }
    }

    /// Drop the cached manager. Used for test isolation.
    pub async fn reset(&self) {
        *self.manager.write().await = None;
    }
}
