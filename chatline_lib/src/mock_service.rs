use crate::client::SessionEvent;
use crate::errors::{ChatlineError, Result};
use crate::service::{validate_search_term, ChatService};
use crate::transport::{ChannelEvent, Transport};
use crate::types::{ChatMessage, ConnectionStatus, Friend, FriendRequest, RequestAction, UserId};
use async_trait::async_trait;
use chrono::Local;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

#[derive(Debug, Default)]
struct MockState {
    /// Everyone the server knows, searchable by name.
    directory: Vec<Friend>,
    friends: Vec<Friend>,
    requests: Vec<FriendRequest>,
    outgoing_requests: Vec<UserId>,
    messages: Vec<ChatMessage>,
    history_errors: HashMap<UserId, String>,
    history_delays: HashMap<UserId, Duration>,
    unreachable: bool,
}

/// In-memory chat server for tests and offline demos.
#[derive(Debug, Clone)]
pub struct MockChatService {
    self_id: UserId,
    state: Arc<RwLock<MockState>>,
}

impl MockChatService {
    pub fn new(self_id: UserId) -> Self {
        Self {
            self_id,
            state: Arc::new(RwLock::new(MockState::default())),
        }
    }

    pub async fn new_with_data(self_id: UserId) -> Self {
        let service = Self::new(self_id);
        service.setup_fake_data().await;
        service
    }

    async fn setup_fake_data(&self) {
        self.add_friend(2, "alice").await;
        self.add_friend(3, "bob").await;
        self.add_friend(4, "charlie").await;
        self.add_user(5, "diana").await;
        self.add_user(6, "eve").await;
        self.add_request(1, 5, "diana").await;

        let me = self.self_id;
        self.push_message(ChatMessage::new(2, me, "Hey! How's it going?", "09:12")).await;
        self.push_message(ChatMessage::new(me, 2, "Pretty good, you?", "09:14")).await;
        self.push_message(ChatMessage::new(2, me, "Can't complain.", "09:15")).await;
        self.push_message(ChatMessage::new(4, me, "Thanks for the help earlier!", "11:40")).await;
    }

    pub fn self_id(&self) -> UserId {
        self.self_id
    }

    /// Register a user that can be found by search but is not a friend yet.
    pub async fn add_user(&self, id: UserId, username: &str) {
        let mut state = self.state.write().await;
        if !state.directory.iter().any(|u| u.id == id) {
            state.directory.push(Friend {
                id,
                username: username.to_string(),
            });
        }
    }

    pub async fn add_friend(&self, id: UserId, username: &str) {
        self.add_user(id, username).await;
        let mut state = self.state.write().await;
        if !state.friends.iter().any(|f| f.id == id) {
            state.friends.push(Friend {
                id,
                username: username.to_string(),
            });
        }
    }

    pub async fn add_request(&self, request_id: i64, from_id: UserId, from_username: &str) {
        self.add_user(from_id, from_username).await;
        let mut state = self.state.write().await;
        state.requests.push(FriendRequest {
            request_id,
            from_id,
            from_username: from_username.to_string(),
        });
    }

    pub async fn push_message(&self, message: ChatMessage) {
        let mut state = self.state.write().await;
        let mut stored = message;
        stored.provisional_id = None;
        state.messages.push(stored);
    }

    /// Make the next history loads for `friend_id` answer with `{ "error": .. }`.
    pub async fn fail_history_with(&self, friend_id: UserId, error: &str) {
        let mut state = self.state.write().await;
        state.history_errors.insert(friend_id, error.to_string());
    }

    pub async fn set_history_delay(&self, friend_id: UserId, delay: Duration) {
        let mut state = self.state.write().await;
        state.history_delays.insert(friend_id, delay);
    }

    /// Simulate the server being unreachable for all request/response calls.
    pub async fn set_unreachable(&self, unreachable: bool) {
        let mut state = self.state.write().await;
        state.unreachable = unreachable;
    }

    pub async fn messages_between(&self, a: UserId, b: UserId) -> Vec<ChatMessage> {
        let state = self.state.read().await;
        state
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == a && m.receiver_id == b) || (m.sender_id == b && m.receiver_id == a)
            })
            .cloned()
            .collect()
    }

    async fn check_reachable(&self) -> Result<()> {
        if self.state.read().await.unreachable {
            return Err(ChatlineError::Transport("server unreachable".into()));
        }
        Ok(())
    }
}

/// Canned reply text, picked deterministically from the message body.
pub fn generate_fake_response(message: &str) -> String {
    let mut hasher = DefaultHasher::new();
    message.hash(&mut hasher);
    let hash = hasher.finish() as usize;

    let responses = [
        "Sounds good!",
        "I see what you mean.",
        "That's interesting to hear.",
        "Thanks for letting me know!",
        "I'll think about that.",
        "Good to hear from you!",
        "Let me get back to you on that.",
        "That makes sense.",
    ];
    responses
        .get(hash % responses.len())
        .unwrap_or(&"Thanks!")
        .to_string()
}

fn now_hhmm() -> String {
    Local::now().format("%H:%M").to_string()
}

#[async_trait]
impl ChatService for MockChatService {
    async fn load_history(&self, friend_id: UserId) -> Result<Vec<ChatMessage>> {
        let delay = self.state.read().await.history_delays.get(&friend_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_reachable().await?;

        let state = self.state.read().await;
        if let Some(error) = state.history_errors.get(&friend_id) {
            return Err(ChatlineError::Service(error.clone()));
        }
        if !state.friends.iter().any(|f| f.id == friend_id) {
            return Err(ChatlineError::Service("User is not your friend".into()));
        }
        drop(state);
        Ok(self.messages_between(self.self_id, friend_id).await)
    }

    async fn search_friend(&self, term: &str) -> Result<String> {
        let term = validate_search_term(term)?;
        self.check_reachable().await?;

        let mut state = self.state.write().await;
        let user = state
            .directory
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(term))
            .cloned()
            .ok_or_else(|| ChatlineError::Service("User not found".into()))?;

        if user.id == self.self_id {
            return Err(ChatlineError::Service("You cannot add yourself".into()));
        }
        if state.friends.iter().any(|f| f.id == user.id) {
            return Err(ChatlineError::Service("User is already your friend".into()));
        }
        if state.outgoing_requests.contains(&user.id) {
            return Err(ChatlineError::Service("Request already sent".into()));
        }
        state.outgoing_requests.push(user.id);
        Ok(format!("Request sent to {}", user.username))
    }

    async fn handle_friend_request(&self, request_id: i64, action: RequestAction) -> Result<String> {
        self.check_reachable().await?;

        let mut state = self.state.write().await;
        let index = state
            .requests
            .iter()
            .position(|r| r.request_id == request_id)
            .ok_or_else(|| ChatlineError::Service("Request not found".into()))?;
        let request = state.requests.remove(index);

        match action {
            RequestAction::Accept => {
                if !state.friends.iter().any(|f| f.id == request.from_id) {
                    state.friends.push(Friend {
                        id: request.from_id,
                        username: request.from_username,
                    });
                }
                Ok("Request accepted".to_string())
            }
            RequestAction::Decline => Ok("Request declined".to_string()),
        }
    }

    async fn friends(&self) -> Result<Vec<Friend>> {
        self.check_reachable().await?;
        Ok(self.state.read().await.friends.clone())
    }

    async fn friend_requests(&self) -> Result<Vec<FriendRequest>> {
        self.check_reachable().await?;
        Ok(self.state.read().await.requests.clone())
    }
}

/// Channel stand-in wired to a [`MockChatService`]: sends are stored as
/// history and, unless disabled, echoed back with their provisional id the
/// way the real server broadcasts to the sender's room.
#[derive(Debug, Clone)]
pub struct MockTransport {
    service: MockChatService,
    events: mpsc::Sender<SessionEvent>,
    emitted: Arc<RwLock<Vec<ChannelEvent>>>,
    echo: bool,
    auto_reply: Option<Duration>,
    fail_emits: Arc<RwLock<bool>>,
}

impl MockTransport {
    pub fn new(service: MockChatService, events: mpsc::Sender<SessionEvent>) -> Self {
        let _ = events.try_send(SessionEvent::Connection(ConnectionStatus::Connected));
        Self {
            service,
            events,
            emitted: Arc::new(RwLock::new(Vec::new())),
            echo: true,
            auto_reply: None,
            fail_emits: Arc::new(RwLock::new(false)),
        }
    }

    /// Stop echoing sends, leaving them pending forever.
    pub fn without_echo(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Have the receiver answer every message after `delay`.
    pub fn with_auto_reply(mut self, delay: Duration) -> Self {
        self.auto_reply = Some(delay);
        self
    }

    pub async fn set_failing(&self, failing: bool) {
        *self.fail_emits.write().await = failing;
    }

    pub async fn emitted(&self) -> Vec<ChannelEvent> {
        self.emitted.read().await.clone()
    }

    /// Deliver a message as if the server had broadcast it to our room.
    pub async fn inject(&self, message: ChatMessage) -> Result<()> {
        self.events
            .send(SessionEvent::Inbound(message))
            .await
            .map_err(|_| ChatlineError::ChannelClosed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn emit(&self, event: ChannelEvent) -> Result<()> {
        if *self.fail_emits.read().await {
            return Err(ChatlineError::Transport("mock channel is down".into()));
        }
        self.emitted.write().await.push(event.clone());

        let ChannelEvent::SendMessage(send) = event else {
            return Ok(());
        };

        let confirmed = ChatMessage::new(send.sender_id, send.receiver_id, send.body.clone(), now_hhmm());
        self.service.push_message(confirmed.clone()).await;

        if self.echo {
            // emit runs on the session task, so never block on its own queue.
            let echo = confirmed.with_provisional_id(send.provisional_id.clone());
            match self.events.try_send(SessionEvent::Inbound(echo)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(event)) => {
                    let events = self.events.clone();
                    tokio::spawn(async move {
                        let _ = events.send(event).await;
                    });
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return Err(ChatlineError::ChannelClosed),
            }
        }

        if let Some(delay) = self.auto_reply {
            let reply = ChatMessage::new(
                send.receiver_id,
                send.sender_id,
                generate_fake_response(&send.body),
                now_hhmm(),
            );
            let service = self.service.clone();
            let events = self.events.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                service.push_message(reply.clone()).await;
                if events.send(SessionEvent::Inbound(reply)).await.is_err() {
                    debug!("session gone before auto reply");
                }
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_history_requires_friendship() {
        let service = MockChatService::new_with_data(1).await;
        assert_eq!(service.load_history(2).await.unwrap().len(), 3);
        assert!(service.load_history(5).await.unwrap_err().is_service_error());
    }

    #[tokio::test]
    async fn test_search_friend_rules() {
        let service = MockChatService::new_with_data(1).await;
        service.add_user(1, "me").await;
        assert!(matches!(
            service.search_friend("").await,
            Err(ChatlineError::InvalidInput(_))
        ));
        assert!(service.search_friend("nobody").await.unwrap_err().is_service_error());
        assert!(service.search_friend("me").await.unwrap_err().is_service_error());
        assert!(service.search_friend("alice").await.unwrap_err().is_service_error());
        assert_eq!(service.search_friend("Eve").await.unwrap(), "Request sent to eve");
        assert!(service.search_friend("eve").await.unwrap_err().is_service_error());
    }

    #[tokio::test]
    async fn test_accepting_request_adds_friend() {
        let service = MockChatService::new_with_data(1).await;
        assert_eq!(
            service.handle_friend_request(1, RequestAction::Accept).await.unwrap(),
            "Request accepted"
        );
        assert!(service.friends().await.unwrap().iter().any(|f| f.id == 5));
        assert!(service.friend_requests().await.unwrap().is_empty());
        assert!(service
            .handle_friend_request(1, RequestAction::Decline)
            .await
            .unwrap_err()
            .is_service_error());
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_failure() {
        let service = MockChatService::new_with_data(1).await;
        service.set_unreachable(true).await;
        assert!(service.load_history(2).await.unwrap_err().is_transport_failure());
    }

    #[test]
    fn test_fake_response_is_deterministic() {
        assert_eq!(generate_fake_response("hello"), generate_fake_response("hello"));
    }
}
