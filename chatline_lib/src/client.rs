//! Session actor: owns the [`ChatSession`], drains one event queue in order
//! and publishes a [`SessionSnapshot`] after every event.

use crate::config::ChatlineConfig;
use crate::errors::{ChatlineError, Result};
use crate::http_service::HttpChatService;
use crate::service::ChatService;
use crate::session::{ChatSession, HistoryRequest, SessionSnapshot};
use crate::transport::{ChannelEvent, OutboundSend, Transport, WsTransport};
use crate::types::{ChatMessage, ConnectionStatus, Friend, FriendRequest, ProvisionalId, RequestAction, UserId};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum SessionEvent {
    Select { friend_id: UserId, display_name: String },
    Deselect,
    Compose(String),
    /// Resend one failed message, or the newest failed one when `None`.
    Resend(Option<ProvisionalId>),
    Inbound(ChatMessage),
    Connection(ConnectionStatus),
    HistoryLoaded {
        request: HistoryRequest,
        result: Result<Vec<ChatMessage>>,
    },
    Tick,
    Shutdown,
}

/// Handle used by front ends. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChatClient {
    self_id: UserId,
    events: mpsc::Sender<SessionEvent>,
    snapshots: watch::Receiver<SessionSnapshot>,
    service: Arc<dyn ChatService>,
}

impl ChatClient {
    /// Log in (when credentials are configured), open the channel and start the
    /// session actor.
    pub async fn connect(config: &ChatlineConfig) -> Result<(Self, JoinHandle<()>)> {
        let self_id = config.require_user_id()?;
        let http = HttpChatService::new(&config.server_url)?;
        if let (Some(email), Some(password)) = (&config.email, &config.password) {
            http.login(email, password).await?;
        }

        let (events_tx, events_rx) = mpsc::channel(config.event_buffer);
        let channel_url = config.channel_url()?;
        let transport = WsTransport::connect(&channel_url, events_tx.clone()).await?;

        Ok(Self::spawn(
            self_id,
            config,
            Arc::new(http),
            Arc::new(transport),
            events_tx,
            events_rx,
        ))
    }

    /// Start the actor over already constructed collaborators. `events_tx` must
    /// be the sender the transport posts inbound events to.
    pub fn spawn(
        self_id: UserId,
        config: &ChatlineConfig,
        service: Arc<dyn ChatService>,
        transport: Arc<dyn Transport>,
        events_tx: mpsc::Sender<SessionEvent>,
        events_rx: mpsc::Receiver<SessionEvent>,
    ) -> (Self, JoinHandle<()>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::empty(self_id));
        let runner = SessionRunner {
            session: ChatSession::new(self_id, config.pending_timeout),
            service: Arc::clone(&service),
            transport,
            loopback: events_tx.downgrade(),
            events: events_rx,
            snapshots: snapshot_tx,
            connection: ConnectionStatus::Connecting,
            history_timeout: config.history_timeout,
        };
        let handle = tokio::spawn(runner.run());
        let client = Self {
            self_id,
            events: events_tx,
            snapshots: snapshot_rx,
            service,
        };
        (client, handle)
    }

    pub fn self_id(&self) -> UserId {
        self.self_id
    }

    async fn post(&self, event: SessionEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| ChatlineError::ChannelClosed)
    }

    pub async fn select(&self, friend_id: UserId, display_name: impl Into<String>) -> Result<()> {
        self.post(SessionEvent::Select {
            friend_id,
            display_name: display_name.into(),
        })
        .await
    }

    pub async fn deselect(&self) -> Result<()> {
        self.post(SessionEvent::Deselect).await
    }

    pub async fn compose(&self, body: impl Into<String>) -> Result<()> {
        self.post(SessionEvent::Compose(body.into())).await
    }

    pub async fn resend(&self, provisional_id: ProvisionalId) -> Result<()> {
        self.post(SessionEvent::Resend(Some(provisional_id))).await
    }

    pub async fn resend_latest_failed(&self) -> Result<()> {
        self.post(SessionEvent::Resend(None)).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.post(SessionEvent::Shutdown).await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`. Returns `None`
    /// on timeout or when the actor has stopped.
    pub async fn wait_for<F>(&self, timeout: Duration, mut predicate: F) -> Option<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshots.clone();
        // Bound to a local so the borrowed snapshot is released before `rx`.
        let outcome = tokio::time::timeout(timeout, rx.wait_for(|s| predicate(s))).await;
        match outcome {
            Ok(Ok(snapshot)) => Some(snapshot.clone()),
            _ => None,
        }
    }

    pub async fn friends(&self) -> Result<Vec<Friend>> {
        self.service.friends().await
    }

    pub async fn friend_requests(&self) -> Result<Vec<FriendRequest>> {
        self.service.friend_requests().await
    }

    pub async fn search_friend(&self, term: &str) -> Result<String> {
        self.service.search_friend(term).await
    }

    pub async fn handle_friend_request(&self, request_id: i64, action: RequestAction) -> Result<String> {
        self.service.handle_friend_request(request_id, action).await
    }
}

struct SessionRunner {
    session: ChatSession,
    service: Arc<dyn ChatService>,
    transport: Arc<dyn Transport>,
    /// Weak so in-flight history loads do not keep the queue open.
    loopback: mpsc::WeakSender<SessionEvent>,
    events: mpsc::Receiver<SessionEvent>,
    snapshots: watch::Sender<SessionSnapshot>,
    connection: ConnectionStatus,
    history_timeout: Duration,
}

impl SessionRunner {
    async fn run(mut self) {
        let self_id = self.session.self_id();
        if let Err(e) = self.transport.emit(ChannelEvent::Join { room: self_id }).await {
            warn!(error = %e, "failed to join own room");
        }
        self.publish();

        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            let event = tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = sweep.tick() => SessionEvent::Tick,
            };
            if !self.handle(event).await {
                break;
            }
            self.publish();
        }
        info!(self_id, "session stopped");
    }

    /// Returns false when the session should stop.
    async fn handle(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Select {
                friend_id,
                display_name,
            } => {
                let request = self.session.select(friend_id, display_name);
                self.spawn_history_load(request);
            }
            SessionEvent::Deselect => self.session.deselect(),
            SessionEvent::Compose(body) => {
                if let Some(send) = self.session.compose(&body) {
                    self.emit_send(send).await;
                }
            }
            SessionEvent::Resend(target) => {
                let now = Utc::now();
                let send = match target {
                    Some(provisional_id) => self.session.resend(&provisional_id, now),
                    None => self.session.resend_latest_failed(now),
                };
                match send {
                    Some(send) => self.emit_send(send).await,
                    None => debug!("nothing to resend"),
                }
            }
            SessionEvent::Inbound(message) => {
                self.session.on_message_event(message);
            }
            SessionEvent::Connection(status) => {
                info!(?status, "connection status changed");
                self.connection = status;
            }
            SessionEvent::HistoryLoaded { request, result } => {
                self.session.apply_history(request, result);
            }
            SessionEvent::Tick => {
                self.session.expire_pending(Utc::now());
            }
            SessionEvent::Shutdown => return false,
        }
        true
    }

    /// A failed emit leaves the entry pending; the sweep marks it failed.
    async fn emit_send(&mut self, send: OutboundSend) {
        let provisional_id = send.provisional_id.clone();
        if let Err(e) = self.transport.emit(ChannelEvent::SendMessage(send)).await {
            warn!(%provisional_id, error = %e, "send request could not be emitted");
            if e.is_transport_failure() {
                self.connection = ConnectionStatus::Disconnected;
            }
        }
    }

    fn spawn_history_load(&self, request: HistoryRequest) {
        let service = Arc::clone(&self.service);
        let loopback = self.loopback.clone();
        let timeout = self.history_timeout;
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, service.load_history(request.friend_id)).await {
                Ok(result) => result,
                Err(_) => Err(ChatlineError::Transport("history request timed out".into())),
            };
            match loopback.upgrade() {
                Some(events) => {
                    let _ = events.send(SessionEvent::HistoryLoaded { request, result }).await;
                }
                None => debug!(friend_id = request.friend_id, "session gone before history arrived"),
            }
        });
    }

    fn publish(&self) {
        let snapshot = self.session.snapshot(self.connection);
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}
