// Hub REST client
//
// Wraps `reqwest::Client` with hub-specific URL construction and error
// envelope handling. The hub speaks plain JSON over HTTP: reads return
// either the requested body or an `[{"error": {...}}]` array, writes
// always return an array of per-attribute success/error entries.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::ApiError;
use crate::types::{
    ApiReply, ConfigResponse, FullState, Handshake, ERROR_LINK_BUTTON, ERROR_UNAUTHORIZED,
};

/// Connection parameters for a hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Host (or `host:port`) of the hub's REST API.
    pub host: String,
    /// Registered application key.
    pub api_key: SecretString,
    /// Event WebSocket port to use when the hub's handshake does not
    /// advertise one.
    pub event_port: Option<u16>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// HTTP client for a Hue-compatible hub.
///
/// Cheaply cloneable -- `reqwest::Client` is an `Arc` internally.
#[derive(Clone)]
pub struct HubClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
}

impl HubClient {
    /// Create a client. Does not touch the network -- call
    /// [`connect()`](Self::connect) to perform the handshake.
    pub fn new(config: &HubConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(&format!("http://{}/", config.host))?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// The hub's hostname, for building the event WebSocket URL.
    pub fn host(&self) -> &str {
        self.base_url.host_str().unwrap_or_default()
    }

    fn api_url(&self, suffix: &str) -> Result<Url, ApiError> {
        let path = if suffix.is_empty() {
            format!("api/{}", self.api_key.expose_secret())
        } else {
            format!("api/{}/{suffix}", self.api_key.expose_secret())
        };
        Ok(self.base_url.join(&path)?)
    }

    // ── Handshake ────────────────────────────────────────────────────

    /// Fetch the hub's identity and event-stream advertisement.
    ///
    /// A rejected application key surfaces as [`ApiError::Unauthorized`].
    pub async fn connect(&self) -> Result<Handshake, ApiError> {
        let raw: ConfigResponse = self.get_json("config").await?;
        debug!(name = %raw.name, api_version = %raw.apiversion, "hub handshake complete");
        Ok(raw.into())
    }

    // ── Snapshot ─────────────────────────────────────────────────────

    /// Fetch the full device tables (lights, groups, sensors).
    pub async fn fetch_snapshot(&self) -> Result<FullState, ApiError> {
        let state: FullState = self.get_json("").await?;
        debug!(devices = state.device_count(), "snapshot fetched");
        Ok(state)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Apply a state change to a light.
    pub async fn set_light_state(
        &self,
        id: &str,
        attributes: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ApiError> {
        self.put_state(&format!("lights/{id}/state"), attributes)
            .await
    }

    /// Apply an action to a group.
    pub async fn set_group_action(
        &self,
        id: &str,
        attributes: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ApiError> {
        self.put_state(&format!("groups/{id}/action"), attributes)
            .await
    }

    async fn put_state(
        &self,
        suffix: &str,
        attributes: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ApiError> {
        let url = self.api_url(suffix)?;
        let body = self
            .http
            .put(url)
            .json(attributes)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let replies: Vec<ApiReply> = parse_body(&body)?;
        for reply in replies {
            if let Some(err) = reply.error {
                return Err(match err.kind {
                    ERROR_UNAUTHORIZED => ApiError::Unauthorized {
                        message: err.description,
                    },
                    _ => ApiError::CommandRejected {
                        address: err.address,
                        description: err.description,
                    },
                });
            }
        }
        Ok(())
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Register a new application key with the hub.
    ///
    /// Requires the hub's link button to have been pressed; otherwise
    /// returns [`ApiError::LinkButtonNotPressed`].
    pub async fn register(host: &str, devicetype: &str) -> Result<String, ApiError> {
        let url = Url::parse(&format!("http://{host}/"))?.join("api")?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let body = http
            .post(url)
            .json(&serde_json::json!({ "devicetype": devicetype }))
            .send()
            .await?
            .text()
            .await?;

        let replies: Vec<ApiReply> = parse_body(&body)?;
        for reply in replies {
            if let Some(err) = reply.error {
                return Err(match err.kind {
                    ERROR_LINK_BUTTON => ApiError::LinkButtonNotPressed,
                    kind => ApiError::Hub {
                        kind,
                        address: err.address,
                        description: err.description,
                    },
                });
            }
            if let Some(success) = reply.success {
                if let Some(username) = success.get("username").and_then(|v| v.as_str()) {
                    return Ok(username.to_owned());
                }
            }
        }

        Err(ApiError::Deserialization {
            message: "registration reply contained no username".into(),
            body,
        })
    }

    // ── Shared request plumbing ──────────────────────────────────────

    /// GET an API path and parse the body, unwrapping the hub's error
    /// envelope. The hub returns errors with HTTP 200, so the body has
    /// to be inspected either way.
    async fn get_json<T: DeserializeOwned>(&self, suffix: &str) -> Result<T, ApiError> {
        let url = self.api_url(suffix)?;
        let body = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        match parse_body::<T>(&body) {
            Ok(value) => Ok(value),
            // Expected body didn't parse -- check for an error envelope
            // before reporting a deserialization failure.
            Err(parse_err) => {
                if let Ok(replies) = serde_json::from_str::<Vec<ApiReply>>(&body) {
                    if let Some(err) = replies.into_iter().find_map(|r| r.error) {
                        return Err(match err.kind {
                            ERROR_UNAUTHORIZED => ApiError::Unauthorized {
                                message: err.description,
                            },
                            kind => ApiError::Hub {
                                kind,
                                address: err.address,
                                description: err.description,
                            },
                        });
                    }
                }
                Err(parse_err)
            }
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Deserialization {
        message: e.to_string(),
        body: body.to_owned(),
    })
}
