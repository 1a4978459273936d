//! Wire events and the bidirectional channel they travel over.
//!
//! Frames are JSON text: `{ "event": "<name>", "data": { .. } }`.

use crate::client::SessionEvent;
use crate::errors::{ChatlineError, Result};
use crate::types::{ChatMessage, ConnectionStatus, ProvisionalId, UserId};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

const OUTGOING_BUFFER: usize = 64;

/// Send request for a locally composed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundSend {
    #[serde(rename = "message")]
    pub body: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(rename = "tempId")]
    pub provisional_id: ProvisionalId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// Subscribe this connection to the room named after a user id.
    Join { room: UserId },
    SendMessage(OutboundSend),
    ReceiveMessage(ChatMessage),
}

pub fn encode_event(event: &ChannelEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

pub fn decode_event(text: &str) -> Result<ChannelEvent> {
    Ok(serde_json::from_str(text)?)
}

#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn emit(&self, event: ChannelEvent) -> Result<()>;
}

/// WebSocket channel. Inbound messages are posted onto the session queue in
/// arrival order; outbound frames go through a single writer task.
#[derive(Debug)]
pub struct WsTransport {
    outgoing: mpsc::Sender<String>,
}

impl WsTransport {
    pub async fn connect(url: &str, events: mpsc::Sender<SessionEvent>) -> Result<Self> {
        let parsed = Url::parse(url)?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ChatlineError::Config(format!(
                "channel url must use ws:// or wss://, got '{}'",
                url
            )));
        }

        let _ = events
            .send(SessionEvent::Connection(ConnectionStatus::Connecting))
            .await;
        let (ws_stream, _) = connect_async(parsed.as_str()).await?;
        info!(%url, "channel connected");
        let (mut write, mut read) = ws_stream.split();

        let (tx, mut rx) = mpsc::channel::<String>(OUTGOING_BUFFER);
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = write.send(Message::Text(text)).await {
                    warn!(error = %e, "channel write failed");
                    break;
                }
            }
            let _ = write.close().await;
        });

        let _ = events
            .send(SessionEvent::Connection(ConnectionStatus::Connected))
            .await;

        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => match decode_event(&text) {
                        Ok(ChannelEvent::ReceiveMessage(message)) => {
                            if events.send(SessionEvent::Inbound(message)).await.is_err() {
                                // Session is gone.
                                return;
                            }
                        }
                        Ok(other) => debug!(?other, "ignoring non-message channel event"),
                        Err(e) => warn!(error = %e, "undecodable channel frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "channel read failed");
                        break;
                    }
                }
            }
            info!("channel closed");
            let _ = events
                .send(SessionEvent::Connection(ConnectionStatus::Disconnected))
                .await;
        });

        Ok(Self { outgoing: tx })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn emit(&self, event: ChannelEvent) -> Result<()> {
        let text = encode_event(&event)?;
        self.outgoing
            .send(text)
            .await
            .map_err(|_| ChatlineError::Transport("channel writer has stopped".into()))
    }
}
