use crate::errors::{ChatlineError, Result};
use crate::types::{ChatMessage, Friend, FriendRequest, RequestAction, UserId};
use serde::Deserialize;

/// Request/response endpoints of the chat server. Message delivery itself goes
/// over the [`crate::transport::Transport`] channel.
#[async_trait::async_trait]
pub trait ChatService: Send + Sync + std::fmt::Debug {
    /// Full history with one friend, oldest first.
    async fn load_history(&self, friend_id: UserId) -> Result<Vec<ChatMessage>>;

    /// Send a friend request to the user matching `term` (email or username).
    /// Returns the server's success text.
    async fn search_friend(&self, term: &str) -> Result<String>;

    async fn handle_friend_request(&self, request_id: i64, action: RequestAction) -> Result<String>;

    async fn friends(&self) -> Result<Vec<Friend>>;

    async fn friend_requests(&self) -> Result<Vec<FriendRequest>>;
}

/// Reject blank search terms before any network call.
pub fn validate_search_term(term: &str) -> Result<&str> {
    let term = term.trim();
    if term.is_empty() {
        return Err(ChatlineError::InvalidInput(
            "Enter an email or username".to_string(),
        ));
    }
    Ok(term)
}

/// `{ "success": .. } | { "error": .. }` body used by the mutation endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ServiceReply {
    Success { success: String },
    Error { error: String },
}

impl ServiceReply {
    pub fn into_result(self) -> Result<String> {
        match self {
            ServiceReply::Success { success } => Ok(success),
            ServiceReply::Error { error } => Err(ChatlineError::Service(error)),
        }
    }
}
