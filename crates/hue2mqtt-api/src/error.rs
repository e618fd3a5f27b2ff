use thiserror::Error;

/// Top-level error type for the `hue2mqtt-api` crate.
///
/// Covers every failure mode across the hub surfaces: transport, the
/// REST API's error envelope, the WebSocket event stream, and app-key
/// registration. `hue2mqtt-core` maps these into bridge-level errors.
#[derive(Debug, Error)]
pub enum ApiError {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Authentication ──────────────────────────────────────────────
    /// The hub rejected the application key.
    #[error("Hub rejected application key: {message}")]
    Unauthorized { message: String },

    /// Registration requires the hub's link button to be pressed first.
    #[error("Link button not pressed -- press it and retry within 30s")]
    LinkButtonNotPressed,

    // ── REST API ────────────────────────────────────────────────────
    /// Structured error from the hub's `{"error": {...}}` envelope.
    #[error("Hub API error {kind} at {address}: {description}")]
    Hub {
        kind: i64,
        address: String,
        description: String,
    },

    /// The hub rejected a state-change command.
    #[error("Command rejected at {address}: {description}")]
    CommandRejected {
        address: String,
        description: String,
    },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl ApiError {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if re-authenticating (a new app key) is required.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}
