use super::outbound::OutboundTracker;
use crate::types::{ChatMessage, ConversationTarget, MessageKind, ProvisionalId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NoActiveConversation,
    OtherConversation,
}

/// What to do with one inbound message event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Drop(DropReason),
    /// Our own message came back; swap out the matching pending entry.
    Reconcile(ProvisionalId),
    Render(MessageKind),
}

/// Classify an inbound message. The order of checks matters: the self-echo
/// test must run before the plain render so a provisional row and its
/// confirmed copy are never both visible.
pub fn classify(
    message: &ChatMessage,
    active: Option<&ConversationTarget>,
    self_id: UserId,
    outbound: &OutboundTracker,
) -> Route {
    let Some(target) = active else {
        return Route::Drop(DropReason::NoActiveConversation);
    };

    if !target.involves(message) {
        return Route::Drop(DropReason::OtherConversation);
    }

    if message.sender_id == self_id {
        if let Some(provisional_id) = &message.provisional_id {
            if outbound.contains(provisional_id) {
                return Route::Reconcile(provisional_id.clone());
            }
        }
    }

    Route::Render(message.kind_for(self_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const SELF: UserId = 1;

    fn alex() -> ConversationTarget {
        ConversationTarget::new(7, "Alex")
    }

    #[test]
    fn test_drops_without_active_conversation() {
        let tracker = OutboundTracker::new();
        let msg = ChatMessage::new(7, SELF, "hello", "");
        assert_eq!(
            classify(&msg, None, SELF, &tracker),
            Route::Drop(DropReason::NoActiveConversation)
        );
    }

    #[test]
    fn test_drops_other_conversation() {
        let tracker = OutboundTracker::new();
        let msg = ChatMessage::new(9, SELF, "psst", "");
        assert_eq!(
            classify(&msg, Some(&alex()), SELF, &tracker),
            Route::Drop(DropReason::OtherConversation)
        );
    }

    #[test]
    fn test_received_from_active_friend() {
        let tracker = OutboundTracker::new();
        let msg = ChatMessage::new(7, SELF, "hello", "");
        assert_eq!(
            classify(&msg, Some(&alex()), SELF, &tracker),
            Route::Render(MessageKind::Received)
        );
    }

    #[test]
    fn test_self_echo_with_known_id_reconciles() {
        let mut tracker = OutboundTracker::new();
        let pending = tracker.compose("hi", Some(7), SELF, Utc::now()).unwrap();
        let echo = ChatMessage::new(SELF, 7, "hi", "").with_provisional_id(pending.provisional_id.clone());
        assert_eq!(
            classify(&echo, Some(&alex()), SELF, &tracker),
            Route::Reconcile(pending.provisional_id)
        );
    }

    #[test]
    fn test_self_echo_with_unknown_id_renders_as_sent() {
        let tracker = OutboundTracker::new();
        let echo = ChatMessage::new(SELF, 7, "hi", "").with_provisional_id(ProvisionalId::new("stale"));
        assert_eq!(
            classify(&echo, Some(&alex()), SELF, &tracker),
            Route::Render(MessageKind::Sent)
        );
    }

    #[test]
    fn test_own_message_from_another_device_renders_as_sent() {
        let tracker = OutboundTracker::new();
        let msg = ChatMessage::new(SELF, 7, "from my phone", "");
        assert_eq!(
            classify(&msg, Some(&alex()), SELF, &tracker),
            Route::Render(MessageKind::Sent)
        );
    }

    #[test]
    fn test_foreign_sender_with_temp_id_never_reconciles() {
        let mut tracker = OutboundTracker::new();
        let pending = tracker.compose("hi", Some(7), SELF, Utc::now()).unwrap();
        let spoof = ChatMessage::new(7, SELF, "hi", "").with_provisional_id(pending.provisional_id);
        assert_eq!(
            classify(&spoof, Some(&alex()), SELF, &tracker),
            Route::Render(MessageKind::Received)
        );
    }
}
