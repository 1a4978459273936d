use crate::types::{ConversationTarget, UserId};

/// Handle for one history load. Completions carrying an older generation than
/// the selector's current one belong to a superseded selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRequest {
    pub friend_id: UserId,
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct ConversationSelector {
    active: Option<ConversationTarget>,
    generation: u64,
}

impl ConversationSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `friend_id` the active target and issue a fresh history request.
    pub fn select(&mut self, friend_id: UserId, display_name: impl Into<String>) -> HistoryRequest {
        self.active = Some(ConversationTarget::new(friend_id, display_name));
        self.generation += 1;
        HistoryRequest {
            friend_id,
            generation: self.generation,
        }
    }

    pub fn deselect(&mut self) {
        self.active = None;
        // Invalidate any outstanding load.
        self.generation += 1;
    }

    pub fn active(&self) -> Option<&ConversationTarget> {
        self.active.as_ref()
    }

    pub fn active_friend_id(&self) -> Option<UserId> {
        self.active.as_ref().map(|t| t.friend_id)
    }

    pub fn can_compose(&self) -> bool {
        self.active.is_some()
    }

    /// Last-write-wins: only the most recent request may populate the view.
    pub fn is_current(&self, request: &HistoryRequest) -> bool {
        request.generation == self.generation && self.active_friend_id() == Some(request.friend_id)
    }
}
