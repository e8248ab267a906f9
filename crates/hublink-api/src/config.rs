// ── Runtime connection configuration ──
//
// Describes *how* to reach a hub: REST base, WebSocket endpoint, timeouts.
// Carries no credentials -- those go to `AuthClient` directly -- and never
// touches disk. The embedding application constructs one and hands it in.

use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Version tag the messaging service expects on the socket URL.
const SOCKET_VSN: &str = "2.0.0";

/// Configuration for reaching a single hub account.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// REST API base (login, tokens, device directory).
    /// Must end with a trailing slash so relative joins work.
    pub api_url: Url,
    /// WebSocket endpoint for the real-time messaging service.
    pub websocket_url: Url,
    /// HTTP request timeout.
    pub timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://control.hublink.dev/api/v2/"
                .parse()
                .expect("default api url is valid"),
            websocket_url: "wss://control.hublink.dev/socket/websocket"
                .parse()
                .expect("default websocket url is valid"),
            timeout: Duration::from_secs(30),
        }
    }
}

impl HubConfig {
    /// Config pointing at a custom REST base, deriving the socket URL from
    /// the same host. Useful for self-hosted hubs and tests.
    pub fn with_base(api_url: Url, websocket_url: Url) -> Self {
        Self {
            api_url,
            websocket_url,
            timeout: Duration::from_secs(30),
        }
    }

    /// Resolve a path relative to the REST base.
    pub fn endpoint(&self, path: &str) -> Result<Url, Error> {
        Ok(self.api_url.join(path)?)
    }

    /// The authenticated socket URL for a session token.
    pub fn socket_url(&self, access_token: &str) -> Url {
        let mut url = self.websocket_url.clone();
        url.query_pairs_mut()
            .append_pair("token", access_token)
            .append_pair("vsn", SOCKET_VSN);
        url
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_http(&self) -> Result<reqwest::Client, Error> {
        Ok(reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("hublink/", env!("CARGO_PKG_VERSION")))
            .build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_url_carries_token_and_vsn() {
        let config = HubConfig::default();
        let url = config.socket_url("tok-123");

        assert!(url.as_str().starts_with("wss://"));
        assert!(url.query_pairs().any(|(k, v)| k == "token" && v == "tok-123"));
        assert!(url.query_pairs().any(|(k, v)| k == "vsn" && v == SOCKET_VSN));
    }

    #[test]
    fn endpoint_joins_relative_paths() {
        let config = HubConfig::default();
        let url = config.endpoint("sessions").unwrap();
        assert!(url.path().ends_with("/api/v2/sessions"), "got: {url}");
    }
}
