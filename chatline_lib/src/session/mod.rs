//! Client-side message delivery state: which friend is active, which sends are
//! still unconfirmed, and what the conversation log currently shows.
//!
//! Everything here is synchronous and owned by one [`ChatSession`]; the
//! runtime in [`crate::client`] feeds it one event at a time.

pub mod outbound;
pub mod router;
pub mod selector;
pub mod view;

use crate::errors::ChatlineError;
use crate::transport::OutboundSend;
use crate::types::{ChatMessage, ConnectionStatus, ConversationTarget, ProvisionalId, UserId};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

pub use outbound::{OutboundPendingMessage, OutboundTracker, PendingStatus};
pub use router::{DropReason, Route};
pub use selector::{ConversationSelector, HistoryRequest};
pub use view::{display_text, ConversationView, Placeholder, ViewEntry};

/// Immutable copy of the session handed to renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub self_id: UserId,
    pub active: Option<ConversationTarget>,
    pub entries: Vec<ViewEntry>,
    pub placeholder: Option<Placeholder>,
    pub scroll_offset: usize,
    pub can_compose: bool,
    pub pending_count: usize,
    pub failed_count: usize,
    pub connection: ConnectionStatus,
}

impl SessionSnapshot {
    pub fn empty(self_id: UserId) -> Self {
        Self {
            self_id,
            active: None,
            entries: Vec::new(),
            placeholder: Some(Placeholder::NoConversation),
            scroll_offset: 0,
            can_compose: false,
            pending_count: 0,
            failed_count: 0,
            connection: ConnectionStatus::Disconnected,
        }
    }
}

#[derive(Debug)]
pub struct ChatSession {
    self_id: UserId,
    selector: ConversationSelector,
    outbound: OutboundTracker,
    view: ConversationView,
    pending_timeout: Duration,
}

impl ChatSession {
    pub fn new(self_id: UserId, pending_timeout: Duration) -> Self {
        Self {
            self_id,
            selector: ConversationSelector::new(),
            outbound: OutboundTracker::new(),
            view: ConversationView::new(),
            pending_timeout,
        }
    }

    pub fn self_id(&self) -> UserId {
        self.self_id
    }

    pub fn active(&self) -> Option<&ConversationTarget> {
        self.selector.active()
    }

    pub fn view(&self) -> &ConversationView {
        &self.view
    }

    pub fn outbound(&self) -> &OutboundTracker {
        &self.outbound
    }

    /// Switch the active conversation and start a fresh history load.
    pub fn select(&mut self, friend_id: UserId, display_name: impl Into<String>) -> HistoryRequest {
        let request = self.selector.select(friend_id, display_name);
        self.view.show_placeholder(Placeholder::Loading);
        info!(friend_id, generation = request.generation, "conversation selected");
        request
    }

    pub fn deselect(&mut self) {
        self.selector.deselect();
        self.view.show_placeholder(Placeholder::NoConversation);
        info!("conversation deselected");
    }

    pub fn compose(&mut self, body: &str) -> Option<OutboundSend> {
        self.compose_at(body, Utc::now())
    }

    /// Record, render, then hand back the send request for the channel.
    pub fn compose_at(&mut self, body: &str, now: DateTime<Utc>) -> Option<OutboundSend> {
        let pending = self
            .outbound
            .compose(body, self.selector.active_friend_id(), self.self_id, now)?;
        self.view.render_pending(
            pending.provisional_id.clone(),
            pending.body.clone(),
            pending.display_time.clone(),
        );
        debug!(
            provisional_id = %pending.provisional_id,
            receiver_id = pending.target_friend_id,
            "message composed"
        );
        Some(pending.to_send())
    }

    /// Route one inbound message event and apply the outcome.
    pub fn on_message_event(&mut self, message: ChatMessage) -> Route {
        let route = router::classify(&message, self.selector.active(), self.self_id, &self.outbound);
        match &route {
            Route::Drop(reason) => {
                // Nothing is rendered, but the echo of one of our own sends
                // still proves delivery and retires its pending record.
                let delivered = message.sender_id == self.self_id
                    && message
                        .provisional_id
                        .as_ref()
                        .is_some_and(|id| self.outbound.take(id).is_some());
                debug!(
                    sender_id = message.sender_id,
                    receiver_id = message.receiver_id,
                    ?reason,
                    delivered,
                    "inbound message dropped"
                );
            }
            Route::Reconcile(provisional_id) => {
                self.outbound.take(provisional_id);
                let had_row = self.view.replace_pending(provisional_id, message);
                debug!(%provisional_id, had_row, "pending message confirmed");
            }
            Route::Render(kind) => {
                debug!(sender_id = message.sender_id, ?kind, "inbound message rendered");
                self.view.render_confirmed(message, *kind);
            }
        }
        route
    }

    /// Apply a finished history load. Returns false when the load belonged to
    /// a superseded selection and was discarded.
    pub fn apply_history(
        &mut self,
        request: HistoryRequest,
        result: Result<Vec<ChatMessage>, ChatlineError>,
    ) -> bool {
        if !self.selector.is_current(&request) {
            debug!(
                friend_id = request.friend_id,
                generation = request.generation,
                "stale history load discarded"
            );
            return false;
        }
        match result {
            Ok(messages) => {
                debug!(friend_id = request.friend_id, count = messages.len(), "history loaded");
                self.view.replace_all(messages, self.self_id);
                // Sends still in flight to this friend go back at the tail.
                for pending in self.outbound.pending_for(request.friend_id) {
                    self.view.render_pending(
                        pending.provisional_id.clone(),
                        pending.body.clone(),
                        pending.display_time.clone(),
                    );
                    if pending.status == PendingStatus::Failed {
                        self.view.mark_failed(&pending.provisional_id);
                    }
                }
            }
            Err(ChatlineError::Service(reason)) => {
                warn!(friend_id = request.friend_id, %reason, "history service error");
                self.view.show_placeholder(Placeholder::ServiceError(reason));
            }
            Err(err) => {
                warn!(friend_id = request.friend_id, error = %err, "history load failed");
                self.view.show_placeholder(Placeholder::TransportError);
            }
        }
        true
    }

    /// Mark overdue sends to the active friend as failed. Returns the ids that
    /// changed.
    pub fn expire_pending(&mut self, now: DateTime<Utc>) -> Vec<ProvisionalId> {
        let Some(friend_id) = self.selector.active_friend_id() else {
            return Vec::new();
        };
        let expired = self.outbound.expire(now, self.pending_timeout, friend_id);
        for provisional_id in &expired {
            warn!(%provisional_id, "no echo received, marking message as failed");
            self.view.mark_failed(provisional_id);
        }
        expired
    }

    /// Re-emit a failed send of the open conversation under its original id.
    pub fn resend(&mut self, provisional_id: &ProvisionalId, now: DateTime<Utc>) -> Option<OutboundSend> {
        let friend_id = self.selector.active_friend_id()?;
        if self.outbound.get(provisional_id)?.target_friend_id != friend_id {
            return None;
        }
        let send = self.outbound.retry(provisional_id, now)?;
        self.view.mark_pending(provisional_id);
        info!(%provisional_id, "resending message");
        Some(send)
    }

    pub fn resend_latest_failed(&mut self, now: DateTime<Utc>) -> Option<OutboundSend> {
        let friend_id = self.selector.active_friend_id()?;
        let provisional_id = self.outbound.latest_failed(friend_id)?.provisional_id.clone();
        self.resend(&provisional_id, now)
    }

    /// Pending and failed counts cover the open conversation only.
    pub fn snapshot(&self, connection: ConnectionStatus) -> SessionSnapshot {
        let (pending_count, failed_count) = match self.selector.active_friend_id() {
            Some(friend_id) => (
                self.outbound.pending_for(friend_id).len(),
                self.outbound.failed_count(friend_id),
            ),
            None => (0, 0),
        };
        SessionSnapshot {
            self_id: self.self_id,
            active: self.selector.active().cloned(),
            entries: self.view.entries().to_vec(),
            placeholder: self.view.placeholder().cloned(),
            scroll_offset: self.view.scroll_offset(),
            can_compose: self.selector.can_compose(),
            pending_count,
            failed_count,
            connection,
        }
    }
}
