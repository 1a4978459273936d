use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable integer identity of a user account on the server.
pub type UserId = i64;

/// Client-generated tag that correlates an outgoing message with its echo.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvisionalId(String);

impl ProvisionalId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProvisionalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The friend currently in focus for composing and display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTarget {
    pub friend_id: UserId,
    pub display_name: String,
}

impl ConversationTarget {
    pub fn new(friend_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            friend_id,
            display_name: display_name.into(),
        }
    }

    /// True when `message` belongs to the conversation with this friend.
    pub fn involves(&self, message: &ChatMessage) -> bool {
        message.sender_id == self.friend_id || message.receiver_id == self.friend_id
    }
}

/// A server-confirmed chat message, as delivered by history and the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(default)]
    pub timestamp: String,
    /// Only present when the server echoes the sender's own message back.
    #[serde(rename = "tempId", default, skip_serializing_if = "Option::is_none")]
    pub provisional_id: Option<ProvisionalId>,
}

impl ChatMessage {
    pub fn new(
        sender_id: UserId,
        receiver_id: UserId,
        body: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            sender_id,
            receiver_id,
            body: body.into(),
            timestamp: timestamp.into(),
            provisional_id: None,
        }
    }

    pub fn with_provisional_id(mut self, provisional_id: ProvisionalId) -> Self {
        self.provisional_id = Some(provisional_id);
        self
    }

    /// Classify against the local identity.
    pub fn kind_for(&self, self_id: UserId) -> MessageKind {
        if self.sender_id == self_id {
            MessageKind::Sent
        } else {
            MessageKind::Received
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Sent,
    Received,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Connecting,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub id: UserId,
    pub username: String,
}

/// An incoming, not yet answered friend request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub request_id: i64,
    pub from_id: UserId,
    pub from_username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    Accept,
    Decline,
}

impl RequestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestAction::Accept => "accept",
            RequestAction::Decline => "decline",
        }
    }
}

impl std::str::FromStr for RequestAction {
    type Err = crate::errors::ChatlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" => Ok(RequestAction::Accept),
            "decline" => Ok(RequestAction::Decline),
            other => Err(crate::errors::ChatlineError::InvalidInput(format!(
                "unknown request action '{}', expected accept or decline",
                other
            ))),
        }
    }
}
