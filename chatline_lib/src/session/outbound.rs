use crate::transport::OutboundSend;
use crate::types::{ProvisionalId, UserId};
use chrono::{DateTime, Local, Utc};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

const TOKEN_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    /// Sent, echo not seen yet.
    Awaiting,
    /// No echo within the pending timeout; eligible for resend.
    Failed,
}

/// A locally composed message that the server has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPendingMessage {
    pub provisional_id: ProvisionalId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// `HH:MM` in local time, shown until the confirmed copy replaces it.
    pub display_time: String,
    pub target_friend_id: UserId,
    pub sender_id: UserId,
    pub status: PendingStatus,
    pub attempts: u32,
}

impl OutboundPendingMessage {
    pub fn to_send(&self) -> OutboundSend {
        OutboundSend {
            body: self.body.clone(),
            sender_id: self.sender_id,
            receiver_id: self.target_friend_id,
            provisional_id: self.provisional_id.clone(),
        }
    }
}

/// `<unix millis>_<random token>`: the time part keeps ids roughly ordered,
/// the token separates sends within the same millisecond.
pub fn generate_provisional_id(now: DateTime<Utc>) -> ProvisionalId {
    let token = Uuid::new_v4().simple().to_string();
    ProvisionalId::new(format!(
        "{}_{}",
        now.timestamp_millis(),
        &token[..TOKEN_LEN]
    ))
}

pub fn display_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M").to_string()
}

/// Owns every pending message until the router reconciles it.
#[derive(Debug, Default)]
pub struct OutboundTracker {
    pending: HashMap<ProvisionalId, OutboundPendingMessage>,
}

impl OutboundTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new pending message. Returns `None` (no-op) for blank bodies or
    /// when there is no target.
    pub fn compose(
        &mut self,
        body: &str,
        target_friend_id: Option<UserId>,
        sender_id: UserId,
        now: DateTime<Utc>,
    ) -> Option<OutboundPendingMessage> {
        let body = body.trim();
        if body.is_empty() {
            return None;
        }
        let target_friend_id = target_friend_id?;

        let mut provisional_id = generate_provisional_id(now);
        while self.pending.contains_key(&provisional_id) {
            provisional_id = generate_provisional_id(now);
        }

        let pending = OutboundPendingMessage {
            provisional_id: provisional_id.clone(),
            body: body.to_string(),
            created_at: now,
            display_time: display_time(now),
            target_friend_id,
            sender_id,
            status: PendingStatus::Awaiting,
            attempts: 1,
        };
        self.pending.insert(provisional_id, pending.clone());
        Some(pending)
    }

    /// Remove and return the pending entry. Called only on reconciliation.
    pub fn take(&mut self, provisional_id: &ProvisionalId) -> Option<OutboundPendingMessage> {
        self.pending.remove(provisional_id)
    }

    pub fn contains(&self, provisional_id: &ProvisionalId) -> bool {
        self.pending.contains_key(provisional_id)
    }

    pub fn get(&self, provisional_id: &ProvisionalId) -> Option<&OutboundPendingMessage> {
        self.pending.get(provisional_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Failed sends addressed to `friend_id`.
    pub fn failed_count(&self, friend_id: UserId) -> usize {
        self.pending
            .values()
            .filter(|p| p.target_friend_id == friend_id && p.status == PendingStatus::Failed)
            .count()
    }

    /// Pending entries for one conversation, oldest first.
    pub fn pending_for(&self, friend_id: UserId) -> Vec<&OutboundPendingMessage> {
        let mut out: Vec<_> = self
            .pending
            .values()
            .filter(|p| p.target_friend_id == friend_id)
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.provisional_id.cmp(&b.provisional_id)));
        out
    }

    /// Mark awaiting sends to `friend_id` older than `timeout` as failed and
    /// return their ids. Entries stay in the pending set so a late echo still
    /// reconciles. Sends to other friends are left alone: their echoes are not
    /// routed while another conversation is open.
    pub fn expire(&mut self, now: DateTime<Utc>, timeout: Duration, friend_id: UserId) -> Vec<ProvisionalId> {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let mut expired: Vec<ProvisionalId> = self
            .pending
            .values_mut()
            .filter(|p| {
                p.target_friend_id == friend_id
                    && p.status == PendingStatus::Awaiting
                    && now - p.created_at >= timeout
            })
            .map(|p| {
                p.status = PendingStatus::Failed;
                p.provisional_id.clone()
            })
            .collect();
        expired.sort();
        expired
    }

    /// Put a failed entry back in flight under the same provisional id.
    pub fn retry(&mut self, provisional_id: &ProvisionalId, now: DateTime<Utc>) -> Option<OutboundSend> {
        let pending = self.pending.get_mut(provisional_id)?;
        if pending.status != PendingStatus::Failed {
            return None;
        }
        pending.status = PendingStatus::Awaiting;
        pending.created_at = now;
        pending.attempts += 1;
        Some(pending.to_send())
    }

    /// Most recently created failed send to `friend_id`, if any.
    pub fn latest_failed(&self, friend_id: UserId) -> Option<&OutboundPendingMessage> {
        self.pending
            .values()
            .filter(|p| p.target_friend_id == friend_id && p.status == PendingStatus::Failed)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.provisional_id.cmp(&b.provisional_id)))
    }
}
