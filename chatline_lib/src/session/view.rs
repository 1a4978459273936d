use crate::types::{ChatMessage, MessageKind, ProvisionalId, UserId};

/// One row of the conversation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEntry {
    /// Optimistic copy of a locally composed message.
    Pending {
        provisional_id: ProvisionalId,
        body: String,
        timestamp: String,
        failed: bool,
    },
    Confirmed {
        message: ChatMessage,
        kind: MessageKind,
    },
}

impl ViewEntry {
    pub fn provisional_id(&self) -> Option<&ProvisionalId> {
        match self {
            ViewEntry::Pending { provisional_id, .. } => Some(provisional_id),
            ViewEntry::Confirmed { .. } => None,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            ViewEntry::Pending { body, .. } => body,
            ViewEntry::Confirmed { message, .. } => &message.body,
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            ViewEntry::Pending { timestamp, .. } => timestamp,
            ViewEntry::Confirmed { message, .. } => &message.timestamp,
        }
    }

    /// Pending entries are always our own.
    pub fn kind(&self) -> MessageKind {
        match self {
            ViewEntry::Pending { .. } => MessageKind::Sent,
            ViewEntry::Confirmed { kind, .. } => *kind,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ViewEntry::Pending { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ViewEntry::Pending { failed: true, .. })
    }

    /// Body with terminal control sequences neutralised.
    pub fn display_body(&self) -> String {
        display_text(self.body())
    }
}

/// What the view shows instead of messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    NoConversation,
    Loading,
    Empty,
    ServiceError(String),
    TransportError,
}

impl Placeholder {
    pub fn text(&self) -> String {
        match self {
            Placeholder::NoConversation => "Select a friend to start chatting".to_string(),
            Placeholder::Loading => "Loading messages...".to_string(),
            Placeholder::Empty => "No messages yet. Say hello!".to_string(),
            Placeholder::ServiceError(reason) => display_text(reason),
            Placeholder::TransportError => "Failed to load messages".to_string(),
        }
    }
}

/// Render untrusted text as inert data: keeps newlines, turns tabs into a
/// space and every other control character (ESC, BEL, C1 codes, ...) into
/// U+FFFD so a message body can never drive the terminal.
pub fn display_text(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '\n' => '\n',
            '\t' => ' ',
            c if c.is_control() => '\u{FFFD}',
            c => c,
        })
        .collect()
}

/// Append-only log for the active conversation.
#[derive(Debug, Clone)]
pub struct ConversationView {
    entries: Vec<ViewEntry>,
    placeholder: Option<Placeholder>,
    scroll_offset: usize,
}

impl Default for ConversationView {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            placeholder: Some(Placeholder::NoConversation),
            scroll_offset: 0,
        }
    }
}

impl ConversationView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ViewEntry] {
        &self.entries
    }

    pub fn placeholder(&self) -> Option<&Placeholder> {
        self.placeholder.as_ref()
    }

    /// Index of the newest entry; the view always follows the tail.
    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of rendered entries carrying `provisional_id`.
    pub fn count_provisional(&self, provisional_id: &ProvisionalId) -> usize {
        self.entries
            .iter()
            .filter(|e| e.provisional_id() == Some(provisional_id))
            .count()
    }

    /// Returns false (and renders nothing) if an entry with this id is
    /// already visible.
    pub fn render_pending(
        &mut self,
        provisional_id: ProvisionalId,
        body: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> bool {
        if self.count_provisional(&provisional_id) > 0 {
            return false;
        }
        self.push(ViewEntry::Pending {
            provisional_id,
            body: body.into(),
            timestamp: timestamp.into(),
            failed: false,
        });
        true
    }

    pub fn render_confirmed(&mut self, message: ChatMessage, kind: MessageKind) {
        self.push(ViewEntry::Confirmed { message, kind });
    }

    /// Drop the provisional row and append the confirmed copy at the tail.
    /// Returns whether a provisional row was found.
    pub fn replace_pending(&mut self, provisional_id: &ProvisionalId, message: ChatMessage) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| e.provisional_id() != Some(provisional_id));
        let removed = self.entries.len() != before;
        self.render_confirmed(message, MessageKind::Sent);
        removed
    }

    /// Replace the whole log with a history snapshot.
    pub fn replace_all(&mut self, messages: Vec<ChatMessage>, self_id: UserId) {
        self.entries = messages
            .into_iter()
            .map(|message| {
                let kind = message.kind_for(self_id);
                ViewEntry::Confirmed { message, kind }
            })
            .collect();
        self.placeholder = if self.entries.is_empty() {
            Some(Placeholder::Empty)
        } else {
            None
        };
        self.scroll_to_tail();
    }

    /// Clear the log and show `placeholder` in its place.
    pub fn show_placeholder(&mut self, placeholder: Placeholder) {
        self.entries.clear();
        self.placeholder = Some(placeholder);
        self.scroll_offset = 0;
    }

    pub fn mark_failed(&mut self, provisional_id: &ProvisionalId) -> bool {
        self.set_failed(provisional_id, true)
    }

    pub fn mark_pending(&mut self, provisional_id: &ProvisionalId) -> bool {
        self.set_failed(provisional_id, false)
    }

    fn set_failed(&mut self, provisional_id: &ProvisionalId, value: bool) -> bool {
        for entry in &mut self.entries {
            if let ViewEntry::Pending {
                provisional_id: id,
                failed,
                ..
            } = entry
            {
                if id == provisional_id {
                    *failed = value;
                    return true;
                }
            }
        }
        false
    }

    fn push(&mut self, entry: ViewEntry) {
        self.placeholder = None;
        self.entries.push(entry);
        self.scroll_to_tail();
    }

    fn scroll_to_tail(&mut self) {
        self.scroll_offset = self.entries.len().saturating_sub(1);
    }
}
