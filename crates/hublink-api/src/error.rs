use thiserror::Error;

/// Top-level error type for the `hublink-api` crate.
///
/// Covers the failure modes of everything this crate talks to: the login
/// endpoint, the device directory, and the WebSocket transport.
/// `hublink-core` maps these into engine-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login or token refresh rejected (wrong credentials, revoked token).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing or construction error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// WebSocket connection failed (single attempt, no retry here).
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── REST API ────────────────────────────────────────────────────
    /// Structured error from the hub's REST API.
    #[error("Hub API error (HTTP {status}): {message}")]
    Api { message: String, status: u16 },

    // ── Data ────────────────────────────────────────────────────────
    /// A frame could not be encoded or decoded.
    #[error("Frame codec error: {message}")]
    Decode { message: String },
}

impl Error {
    /// Returns `true` if this error indicates credentials were rejected
    /// and a fresh login might resolve it.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient network error worth a
    /// caller-driven retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::WebSocketConnect(_) => true,
            _ => false,
        }
    }
}
