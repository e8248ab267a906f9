// ── Login collaborator ──
//
// The credential exchange that yields a session token. This runs *before*
// a session exists and is deliberately outside the engine: the engine only
// ever sees the authenticated socket URL the token produces.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::HubConfig;
use crate::error::Error;

/// Tokens returned by a successful login or refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp at which `access_token` expires.
    pub expires: i64,
}

/// Error envelope the hub's REST API uses for every failure.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Client for the hub's session endpoints.
pub struct AuthClient {
    http: reqwest::Client,
    config: HubConfig,
}

impl AuthClient {
    pub fn new(config: HubConfig) -> Result<Self, Error> {
        let http = config.build_http()?;
        Ok(Self { http, config })
    }

    /// Create an auth client with a pre-built `reqwest::Client` (tests,
    /// shared connection pools).
    pub fn with_client(http: reqwest::Client, config: HubConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Exchange email + password for session tokens.
    ///
    /// `POST {base}/sessions`. Rejected credentials surface as
    /// [`Error::Authentication`].
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<SessionTokens, Error> {
        let url = self.config.endpoint("sessions")?;
        debug!(%url, email, "logging in");

        let resp = self
            .http
            .post(url)
            .json(&LoginRequest {
                email,
                password: password.expose_secret(),
            })
            .send()
            .await?;

        Self::parse_token_response(resp).await
    }

    /// Exchange a refresh token for fresh session tokens.
    ///
    /// `POST {base}/tokens` with the refresh token in the
    /// `authorization-x-refresh` header, as the hub's own clients do.
    pub async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, Error> {
        let url = self.config.endpoint("tokens")?;
        debug!(%url, "refreshing session tokens");

        let resp = self
            .http
            .post(url)
            .header("authorization-x-refresh", refresh_token)
            .send()
            .await?;

        Self::parse_token_response(resp).await
    }

    async fn parse_token_response(resp: reqwest::Response) -> Result<SessionTokens, Error> {
        let status = resp.status();

        if status.is_success() {
            return Ok(resp.json::<SessionTokens>().await?);
        }

        let message = error_message(resp).await;

        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Authentication { message });
        }

        Err(Error::Api {
            message,
            status: status.as_u16(),
        })
    }
}

/// Pull the first error description out of the hub's `{errors: [...]}`
/// envelope, falling back to the raw body.
pub(crate) async fn error_message(resp: reqwest::Response) -> String {
    let body = resp.text().await.unwrap_or_default();

    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(&body) {
        if let Some(first) = parsed.errors.first() {
            return first
                .description
                .clone()
                .unwrap_or_else(|| first.code.clone());
        }
    }

    body
}

/// Returns `true` if the hub's error envelope names an `unauthorized` code.
pub(crate) fn body_is_unauthorized(body: &str) -> bool {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.errors.iter().any(|e| e.code == "unauthorized"))
        .unwrap_or(false)
}
