use crate::error::{Result, TuiError};
use chatline_lib::{
    display_text, ChatClient, ChatlineError, Friend, FriendRequest, RequestAction, SessionSnapshot,
};
use chrono::{DateTime, Local};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use tracing::{debug, info, warn};

const NOTICE_SECS: i64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppResult {
    Continue,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Friends,
    Input,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Search(String),
    Accept(i64),
    Decline(i64),
    /// `None` clears the filter.
    Find(Option<String>),
    Refresh,
    Help,
}

/// One line of feedback shown above the input box.
#[derive(Debug, Clone)]
pub struct Notice {
    pub text: String,
    pub is_error: bool,
    pub at: DateTime<Local>,
}

impl Notice {
    pub fn is_fresh(&self, now: DateTime<Local>) -> bool {
        now.signed_duration_since(self.at).num_seconds() < NOTICE_SECS
    }
}

pub fn parse_command(input: &str) -> Result<SlashCommand> {
    let input = input.trim();
    let (command, rest) = match input.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (input, ""),
    };

    match command {
        "/search" => {
            if rest.is_empty() {
                Err(TuiError::Usage {
                    usage: "/search <email or username>",
                })
            } else {
                Ok(SlashCommand::Search(rest.to_string()))
            }
        }
        "/accept" => rest
            .parse()
            .map(SlashCommand::Accept)
            .map_err(|_| TuiError::Usage { usage: "/accept <request id>" }),
        "/decline" => rest
            .parse()
            .map(SlashCommand::Decline)
            .map_err(|_| TuiError::Usage { usage: "/decline <request id>" }),
        "/find" => Ok(SlashCommand::Find(
            (!rest.is_empty()).then(|| rest.to_string()),
        )),
        "/refresh" => Ok(SlashCommand::Refresh),
        "/help" => Ok(SlashCommand::Help),
        other => Err(TuiError::UnknownCommand {
            command: other.to_string(),
        }),
    }
}

/// Service errors carry server text meant for the user; everything else is
/// shown with its category.
fn describe(err: &ChatlineError) -> String {
    match err {
        ChatlineError::Service(reason) | ChatlineError::InvalidInput(reason) => display_text(reason),
        other => display_text(&other.to_string()),
    }
}

pub struct App {
    client: ChatClient,
    pub focus: Focus,
    pub input: String,
    pub friends: Vec<Friend>,
    pub requests: Vec<FriendRequest>,
    pub filter: Option<String>,
    pub selected: usize,
    pub snapshot: SessionSnapshot,
    pub notice: Option<Notice>,
    pub show_help: bool,
    /// Lines scrolled up from the bottom of the conversation.
    pub scroll: usize,
}

impl App {
    pub fn new(client: ChatClient) -> Self {
        let snapshot = client.snapshot();
        Self {
            client,
            focus: Focus::Friends,
            input: String::new(),
            friends: Vec::new(),
            requests: Vec::new(),
            filter: None,
            selected: 0,
            snapshot,
            notice: None,
            show_help: false,
            scroll: 0,
        }
    }

    pub fn notify(&mut self, text: impl Into<String>) {
        self.notice = Some(Notice {
            text: text.into(),
            is_error: false,
            at: Local::now(),
        });
    }

    pub fn notify_error(&mut self, text: impl Into<String>) {
        self.notice = Some(Notice {
            text: text.into(),
            is_error: true,
            at: Local::now(),
        });
    }

    /// Reload friends and incoming requests from the server.
    pub async fn refresh(&mut self) {
        match self.client.friends().await {
            Ok(friends) => self.friends = friends,
            Err(e) => {
                warn!(error = %e, "failed to load friends");
                self.notify_error(format!("Could not load friends: {}", describe(&e)));
            }
        }
        match self.client.friend_requests().await {
            Ok(requests) => self.requests = requests,
            Err(e) => {
                warn!(error = %e, "failed to load friend requests");
                self.notify_error(format!("Could not load requests: {}", describe(&e)));
            }
        }
        self.clamp_selection();
    }

    /// Pick up the latest published session state. Follows the tail whenever
    /// the session reports a new newest entry.
    pub fn sync(&mut self) {
        let snapshot = self.client.snapshot();
        if snapshot.scroll_offset != self.snapshot.scroll_offset || snapshot.active != self.snapshot.active {
            self.scroll = 0;
        }
        self.snapshot = snapshot;
    }

    /// Friends matching the `/find` filter, best match first.
    pub fn visible_friends(&self) -> Vec<&Friend> {
        let Some(pattern) = self.filter.as_deref() else {
            return self.friends.iter().collect();
        };

        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, &Friend)> = self
            .friends
            .iter()
            .filter_map(|f| matcher.fuzzy_match(&f.username, pattern).map(|score| (score, f)))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, f)| f).collect()
    }

    pub fn is_active(&self, friend: &Friend) -> bool {
        self.snapshot.active.as_ref().map(|t| t.friend_id) == Some(friend.id)
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_friends().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    pub async fn handle_key(&mut self, key: KeyEvent) -> AppResult {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') => {
                    info!("exiting");
                    self.client.shutdown().await.ok();
                    return AppResult::Exit;
                }
                KeyCode::Char('r') => {
                    self.resend().await;
                    return AppResult::Continue;
                }
                _ => {}
            }
        }

        if self.show_help {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
                self.show_help = false;
            }
            return AppResult::Continue;
        }

        match key.code {
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Focus::Friends => Focus::Input,
                    Focus::Input => Focus::Friends,
                };
            }
            KeyCode::Esc => {
                if !self.input.is_empty() {
                    self.input.clear();
                } else if self.filter.is_some() {
                    self.filter = None;
                    self.clamp_selection();
                } else if self.snapshot.active.is_some() {
                    self.close_conversation().await;
                }
            }
            KeyCode::PageUp => self.scroll = self.scroll.saturating_add(5),
            KeyCode::PageDown => self.scroll = self.scroll.saturating_sub(5),
            _ => match self.focus {
                Focus::Friends => self.handle_friends_key(key).await,
                Focus::Input => self.handle_input_key(key).await,
            },
        }
        AppResult::Continue
    }

    async fn handle_friends_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.visible_friends().len() {
                    self.selected += 1;
                }
            }
            KeyCode::Enter => self.open_selected().await,
            KeyCode::Char('/') => {
                self.focus = Focus::Input;
                self.input = "/".to_string();
            }
            _ => {}
        }
    }

    async fn handle_input_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(c) => self.input.push(c),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Enter => self.submit().await,
            _ => {}
        }
    }

    async fn open_selected(&mut self) {
        let Some(friend) = self.visible_friends().get(self.selected).map(|f| (*f).clone()) else {
            return;
        };
        debug!(friend_id = friend.id, "opening conversation");
        match self.client.select(friend.id, friend.username.clone()).await {
            Ok(()) => {
                self.focus = Focus::Input;
                self.scroll = 0;
            }
            Err(e) => self.notify_error(describe(&e)),
        }
    }

    async fn close_conversation(&mut self) {
        match self.client.deselect().await {
            Ok(()) => {
                self.focus = Focus::Friends;
                self.scroll = 0;
            }
            Err(e) => self.notify_error(describe(&e)),
        }
    }

    async fn resend(&mut self) {
        if self.snapshot.failed_count == 0 {
            self.notify("Nothing to resend");
            return;
        }
        match self.client.resend_latest_failed().await {
            Ok(()) => self.notify("Resending..."),
            Err(e) => self.notify_error(describe(&e)),
        }
    }

    pub async fn submit(&mut self) {
        let text = std::mem::take(&mut self.input);
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        if text.starts_with('/') {
            match parse_command(text) {
                Ok(command) => self.run_command(command).await,
                Err(e) => self.notify_error(e.to_string()),
            }
            return;
        }

        if !self.snapshot.can_compose {
            self.notify_error("Select a friend first");
            return;
        }
        if let Err(e) = self.client.compose(text).await {
            self.notify_error(describe(&e));
        }
    }

    async fn run_command(&mut self, command: SlashCommand) {
        debug!(?command, "running command");
        match command {
            SlashCommand::Search(term) => match self.client.search_friend(&term).await {
                Ok(reply) => self.notify(display_text(&reply)),
                Err(e) => self.notify_error(describe(&e)),
            },
            SlashCommand::Accept(request_id) => {
                self.answer_request(request_id, RequestAction::Accept).await
            }
            SlashCommand::Decline(request_id) => {
                self.answer_request(request_id, RequestAction::Decline).await
            }
            SlashCommand::Find(pattern) => {
                self.filter = pattern;
                self.selected = 0;
                self.focus = Focus::Friends;
            }
            SlashCommand::Refresh => {
                self.refresh().await;
                self.notify("Refreshed");
            }
            SlashCommand::Help => self.show_help = true,
        }
    }

    async fn answer_request(&mut self, request_id: i64, action: RequestAction) {
        match self.client.handle_friend_request(request_id, action).await {
            Ok(reply) => {
                self.notify(display_text(&reply));
                self.refresh().await;
            }
            Err(e) => self.notify_error(describe(&e)),
        }
    }

    pub fn status_text(&self) -> String {
        let mut parts = Vec::new();

        match &self.snapshot.active {
            Some(target) => parts.push(format!("Chatting with {}", display_text(&target.display_name))),
            None => parts.push("No conversation".to_string()),
        }
        if self.snapshot.pending_count > 0 {
            parts.push(format!("{} pending", self.snapshot.pending_count));
        }
        if self.snapshot.failed_count > 0 {
            parts.push(format!("{} failed (Ctrl+R)", self.snapshot.failed_count));
        }
        if !self.requests.is_empty() {
            parts.push(format!("{} requests", self.requests.len()));
        }
        parts.push(format!("{:?}", self.snapshot.connection));
        parts.push("/help".to_string());

        parts.join(" • ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_lib::{ChatlineConfig, MockChatService, MockTransport, Placeholder};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(3);

    async fn demo_app() -> (App, MockChatService) {
        let service = MockChatService::new_with_data(1).await;
        let (tx, rx) = mpsc::channel(64);
        let transport = MockTransport::new(service.clone(), tx.clone());
        let config = ChatlineConfig::default().user_id(1);
        let (client, _handle) = ChatClient::spawn(
            1,
            &config,
            Arc::new(service.clone()),
            Arc::new(transport),
            tx,
            rx,
        );
        let mut app = App::new(client);
        app.refresh().await;
        (app, service)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    async fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(key(KeyCode::Char(c))).await;
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("/search  sam@example.com ").unwrap(),
            SlashCommand::Search("sam@example.com".into())
        );
        assert_eq!(parse_command("/accept 4").unwrap(), SlashCommand::Accept(4));
        assert_eq!(parse_command("/decline 9").unwrap(), SlashCommand::Decline(9));
        assert_eq!(parse_command("/find al").unwrap(), SlashCommand::Find(Some("al".into())));
        assert_eq!(parse_command("/find").unwrap(), SlashCommand::Find(None));
        assert_eq!(parse_command("/refresh").unwrap(), SlashCommand::Refresh);
        assert_eq!(parse_command("/help").unwrap(), SlashCommand::Help);
    }

    #[test]
    fn test_parse_command_errors() {
        assert!(matches!(parse_command("/search"), Err(TuiError::Usage { .. })));
        assert!(matches!(parse_command("/accept abc"), Err(TuiError::Usage { .. })));
        assert!(matches!(
            parse_command("/dance"),
            Err(TuiError::UnknownCommand { command }) if command == "/dance"
        ));
    }

    #[test]
    fn test_notice_expires() {
        let notice = Notice {
            text: "hi".into(),
            is_error: false,
            at: Local::now() - chrono::Duration::seconds(NOTICE_SECS + 1),
        };
        assert!(!notice.is_fresh(Local::now()));
    }

    #[tokio::test]
    async fn test_refresh_loads_friends_and_requests() {
        let (app, _service) = demo_app().await;
        let names: Vec<_> = app.friends.iter().map(|f| f.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "charlie"]);
        assert_eq!(app.requests.len(), 1);
        assert_eq!(app.requests[0].from_username, "diana");
    }

    #[tokio::test]
    async fn test_navigation_and_enter_selects_friend() {
        let (mut app, _service) = demo_app().await;
        app.handle_key(key(KeyCode::Char('j'))).await;
        app.handle_key(key(KeyCode::Down)).await;
        app.handle_key(key(KeyCode::Down)).await;
        assert_eq!(app.selected, 2);
        app.handle_key(key(KeyCode::Char('k'))).await;
        app.handle_key(key(KeyCode::Enter)).await;
        assert_eq!(app.focus, Focus::Input);

        let snapshot = app
            .client
            .wait_for(WAIT, |s| s.active.as_ref().map(|t| t.friend_id) == Some(3))
            .await
            .expect("bob selected");
        assert_eq!(snapshot.active.unwrap().display_name, "bob");
    }

    #[tokio::test]
    async fn test_typing_and_enter_sends_message() {
        let (mut app, service) = demo_app().await;
        app.handle_key(key(KeyCode::Enter)).await;
        app.client
            .wait_for(WAIT, |s| s.entries.len() == 3)
            .await
            .expect("alice history");
        app.sync();

        type_text(&mut app, "see you soon").await;
        app.handle_key(key(KeyCode::Enter)).await;
        assert!(app.input.is_empty());

        let snapshot = app
            .client
            .wait_for(WAIT, |s| s.entries.len() == 4 && s.pending_count == 0)
            .await
            .expect("send confirmed");
        assert_eq!(snapshot.entries[3].body(), "see you soon");
        assert_eq!(service.messages_between(1, 2).await.len(), 4);
    }

    #[tokio::test]
    async fn test_escape_closes_open_conversation() {
        let (mut app, _service) = demo_app().await;
        app.handle_key(key(KeyCode::Enter)).await;
        app.client
            .wait_for(WAIT, |s| s.entries.len() == 3)
            .await
            .expect("alice history");
        app.sync();

        app.handle_key(key(KeyCode::Esc)).await;
        assert_eq!(app.focus, Focus::Friends);
        let snapshot = app
            .client
            .wait_for(WAIT, |s| s.active.is_none())
            .await
            .expect("conversation closed");
        assert_eq!(snapshot.placeholder, Some(Placeholder::NoConversation));
        assert!(!snapshot.can_compose);
    }

    #[tokio::test]
    async fn test_new_message_returns_to_tail() {
        let (mut app, _service) = demo_app().await;
        app.handle_key(key(KeyCode::Enter)).await;
        app.client
            .wait_for(WAIT, |s| s.entries.len() == 3)
            .await
            .expect("alice history");
        app.sync();
        app.handle_key(key(KeyCode::PageUp)).await;
        assert_eq!(app.scroll, 5);

        type_text(&mut app, "back to the bottom").await;
        app.handle_key(key(KeyCode::Enter)).await;
        app.client
            .wait_for(WAIT, |s| s.entries.len() == 4)
            .await
            .expect("message rendered");
        app.sync();
        assert_eq!(app.scroll, 0);
    }

    #[tokio::test]
    async fn test_message_without_conversation_is_refused() {
        let (mut app, _service) = demo_app().await;
        app.focus = Focus::Input;
        type_text(&mut app, "hello?").await;
        app.handle_key(key(KeyCode::Enter)).await;
        let notice = app.notice.as_ref().expect("notice");
        assert!(notice.is_error);
        assert_eq!(notice.text, "Select a friend first");
        assert_eq!(app.snapshot.placeholder, Some(Placeholder::NoConversation));
    }

    #[tokio::test]
    async fn test_find_filters_friends() {
        let (mut app, _service) = demo_app().await;
        app.input = "/find chr".into();
        app.submit().await;
        let visible: Vec<_> = app.visible_friends().iter().map(|f| f.username.clone()).collect();
        assert_eq!(visible, vec!["charlie"]);

        app.handle_key(key(KeyCode::Esc)).await;
        assert_eq!(app.visible_friends().len(), 3);
    }

    #[tokio::test]
    async fn test_accept_request_adds_friend() {
        let (mut app, _service) = demo_app().await;
        app.input = "/accept 1".into();
        app.submit().await;
        assert_eq!(app.notice.as_ref().map(|n| n.text.as_str()), Some("Request accepted"));
        assert!(app.requests.is_empty());
        assert!(app.friends.iter().any(|f| f.username == "diana"));
    }

    #[tokio::test]
    async fn test_search_reports_service_text() {
        let (mut app, _service) = demo_app().await;
        app.input = "/search alice".into();
        app.submit().await;
        let notice = app.notice.clone().expect("notice");
        assert!(notice.is_error);
        assert!(!notice.text.starts_with("Service error"));

        app.input = "/search eve".into();
        app.submit().await;
        assert_eq!(app.notice.as_ref().map(|n| n.text.as_str()), Some("Request sent to eve"));
    }

    #[tokio::test]
    async fn test_ctrl_r_without_failures_is_noop() {
        let (mut app, _service) = demo_app().await;
        assert_eq!(app.handle_key(ctrl('r')).await, AppResult::Continue);
        assert_eq!(app.notice.as_ref().map(|n| n.text.as_str()), Some("Nothing to resend"));
    }

    #[tokio::test]
    async fn test_help_popup_and_exit() {
        let (mut app, _service) = demo_app().await;
        app.input = "/help".into();
        app.submit().await;
        assert!(app.show_help);
        app.handle_key(key(KeyCode::Esc)).await;
        assert!(!app.show_help);
        assert_eq!(app.handle_key(ctrl('c')).await, AppResult::Exit);
    }

    #[tokio::test]
    async fn test_status_text_mentions_active_friend() {
        let (mut app, _service) = demo_app().await;
        app.handle_key(key(KeyCode::Enter)).await;
        app.client
            .wait_for(WAIT, |s| s.active.is_some())
            .await
            .unwrap();
        app.sync();
        let status = app.status_text();
        assert!(status.contains("Chatting with alice"));
        assert!(status.contains("1 requests"));
    }
}
