use crate::errors::{ChatlineError, Result};
use crate::types::UserId;
use std::env;
use std::time::Duration;

const DEFAULT_SERVER_URL: &str = "http://localhost:5000";
const DEFAULT_PENDING_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HISTORY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct ChatlineConfig {
    pub server_url: String,
    /// Channel endpoint; derived from `server_url` when not set explicitly.
    pub ws_url: Option<String>,
    pub user_id: Option<UserId>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub pending_timeout: Duration,
    pub history_timeout: Duration,
    pub event_buffer: usize,
}

impl Default for ChatlineConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            ws_url: None,
            user_id: None,
            email: None,
            password: None,
            pending_timeout: Duration::from_secs(DEFAULT_PENDING_TIMEOUT_SECS),
            history_timeout: Duration::from_secs(DEFAULT_HISTORY_TIMEOUT_SECS),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl ChatlineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let server_url =
            env::var("CHATLINE_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        let ws_url = env::var("CHATLINE_WS_URL").ok().filter(|v| !v.trim().is_empty());
        let user_id = env::var("CHATLINE_USER_ID")
            .ok()
            .and_then(|v| v.trim().parse::<UserId>().ok());
        let pending_timeout = env::var("CHATLINE_PENDING_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.pending_timeout);

        Self {
            server_url,
            ws_url,
            user_id,
            email: env::var("CHATLINE_EMAIL").ok(),
            password: env::var("CHATLINE_PASSWORD").ok(),
            pending_timeout,
            ..defaults
        }
    }

    pub fn with_server_url(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout = timeout;
        self
    }

    /// The local identity is required for routing and reconciliation.
    pub fn require_user_id(&self) -> Result<UserId> {
        self.user_id.ok_or_else(|| {
            ChatlineError::Config("user id is not set (CHATLINE_USER_ID or --user-id)".into())
        })
    }

    /// Channel URL: explicit `ws_url`, or `server_url` with the scheme swapped
    /// to ws/wss and the `/ws` path.
    pub fn channel_url(&self) -> Result<String> {
        if let Some(ws_url) = &self.ws_url {
            return Ok(ws_url.clone());
        }
        let base = self.server_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            return Err(ChatlineError::Config(format!(
                "server url must start with http:// or https://, got '{}'",
                self.server_url
            )));
        };
        Ok(format!("{}/ws", ws_base))
    }
}
