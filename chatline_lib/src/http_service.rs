use crate::errors::{ChatlineError, Result};
use crate::service::{validate_search_term, ChatService, ServiceReply};
use crate::types::{ChatMessage, Friend, FriendRequest, RequestAction, UserId};
use async_trait::async_trait;
use reqwest::{redirect, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Either the expected data or the server's `{ "error": .. }` object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload<T> {
    Data(T),
    Error { error: String },
}

/// Decode a response body. A structured error wins regardless of status code;
/// anything undecodable counts as a transport failure.
pub(crate) fn decode_payload<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T> {
    match serde_json::from_str::<Payload<T>>(body) {
        Ok(Payload::Data(data)) => Ok(data),
        Ok(Payload::Error { error }) => Err(ChatlineError::Service(error)),
        Err(e) if status.is_success() => Err(ChatlineError::Serialization(e)),
        Err(_) => Err(ChatlineError::Transport(format!("HTTP {}", status))),
    }
}

pub(crate) fn decode_reply(status: StatusCode, body: &str) -> Result<String> {
    match serde_json::from_str::<ServiceReply>(body) {
        Ok(reply) => reply.into_result(),
        Err(e) if status.is_success() => Err(ChatlineError::Serialization(e)),
        Err(_) => Err(ChatlineError::Transport(format!("HTTP {}", status))),
    }
}

/// HTTP client for the chat server. The session cookie set by [`login`] is
/// kept in the client's cookie store and sent with every later request.
///
/// [`login`]: HttpChatService::login
#[derive(Debug, Clone)]
pub struct HttpChatService {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpChatService {
    pub fn new(server_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(server_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(redirect::Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Form login. The server answers a good login with a redirect to the chat
    /// page and a bad one by re-rendering the form.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let url = self.endpoint("login")?;
        let response = self
            .http
            .post(url)
            .form(&[("email", email), ("password", password)])
            .send()
            .await?;

        let status = response.status();
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if status.is_redirection() && location.trim_end_matches('/').ends_with("/chat") {
            info!(%email, "logged in");
            Ok(())
        } else {
            warn!(%email, %status, "login rejected");
            Err(ChatlineError::Service("Invalid email or password".to_string()))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!(%url, "GET");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        decode_payload(status, &body)
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<String> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let response = self.http.post(url).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        decode_reply(status, &body)
    }
}

#[async_trait]
impl ChatService for HttpChatService {
    async fn load_history(&self, friend_id: UserId) -> Result<Vec<ChatMessage>> {
        self.get_json(&format!("messages/{}", friend_id)).await
    }

    async fn search_friend(&self, term: &str) -> Result<String> {
        let term = validate_search_term(term)?;
        self.post_form("search_friend", &[("search_term", term)]).await
    }

    async fn handle_friend_request(&self, request_id: i64, action: RequestAction) -> Result<String> {
        let request_id = request_id.to_string();
        self.post_form(
            "handle_friend_request",
            &[("request_id", request_id.as_str()), ("action", action.as_str())],
        )
        .await
    }

    async fn friends(&self) -> Result<Vec<Friend>> {
        self.get_json("friends").await
    }

    async fn friend_requests(&self) -> Result<Vec<FriendRequest>> {
        self.get_json("friend_requests").await
    }
}
