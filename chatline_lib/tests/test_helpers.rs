#![allow(dead_code)]

use chatline_lib::transport::{decode_event, encode_event, ChannelEvent};
use chatline_lib::{ChatClient, ChatMessage, ChatlineConfig, MockChatService, MockTransport, UserId};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::{accept_async, tungstenite::Message};

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
type Rooms = Arc<Mutex<HashMap<UserId, Vec<mpsc::UnboundedSender<String>>>>>;

/// In-process channel server: joins rooms and broadcasts every send to the
/// receiver's room and, with the sender's tempId, to the sender's room.
#[derive(Debug)]
pub struct EphemeralRelay {
    pub port: u16,
    pub url: String,
    rooms: Rooms,
    accept_task: JoinHandle<()>,
}

impl EphemeralRelay {
    pub async fn start() -> TestResult<Self> {
        Self::start_with_echo(true).await
    }

    /// Relay that never echoes back to the sender.
    pub async fn start_without_echo() -> TestResult<Self> {
        Self::start_with_echo(false).await
    }

    async fn start_with_echo(echo: bool) -> TestResult<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let url = format!("ws://127.0.0.1:{}/ws", port);
        let rooms: Rooms = Arc::new(Mutex::new(HashMap::new()));

        let accept_rooms = Arc::clone(&rooms);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let rooms = Arc::clone(&accept_rooms);
                tokio::spawn(handle_connection(stream, rooms, echo));
            }
        });

        Ok(Self {
            port,
            url,
            rooms,
            accept_task,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn joined(&self, room: UserId) -> bool {
        self.rooms
            .lock()
            .await
            .get(&room)
            .map(|members| !members.is_empty())
            .unwrap_or(false)
    }

    /// Poll until every room in `rooms` has at least one member.
    pub async fn wait_for_rooms(&self, rooms: &[UserId]) {
        for _ in 0..100 {
            let mut all = true;
            for room in rooms {
                all &= self.joined(*room).await;
            }
            if all {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
        panic!("rooms {:?} were never joined", rooms);
    }

    /// Broadcast a message to one room as the server would.
    pub async fn deliver(&self, room: UserId, message: ChatMessage) {
        broadcast(&self.rooms, room, &ChannelEvent::ReceiveMessage(message)).await;
    }
}

impl Drop for EphemeralRelay {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn broadcast(rooms: &Rooms, room: UserId, event: &ChannelEvent) {
    let Ok(text) = encode_event(event) else {
        return;
    };
    if let Some(members) = rooms.lock().await.get(&room) {
        for member in members {
            let _ = member.send(text.clone());
        }
    }
}

async fn handle_connection(stream: TcpStream, rooms: Rooms, echo: bool) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if write.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = read.next().await {
        let Message::Text(text) = frame else {
            continue;
        };
        match decode_event(&text) {
            Ok(ChannelEvent::Join { room }) => {
                rooms.lock().await.entry(room).or_default().push(tx.clone());
            }
            Ok(ChannelEvent::SendMessage(send)) => {
                let message = ChatMessage::new(send.sender_id, send.receiver_id, send.body, "12:00");
                broadcast(&rooms, send.receiver_id, &ChannelEvent::ReceiveMessage(message.clone())).await;
                if echo {
                    let echo = message.with_provisional_id(send.provisional_id);
                    broadcast(&rooms, send.sender_id, &ChannelEvent::ReceiveMessage(echo)).await;
                }
            }
            _ => {}
        }
    }
}

/// One canned HTTP response.
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl StubResponse {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub head: String,
    pub body: String,
}

/// Minimal HTTP/1.1 server answering `"METHOD /path"` keys with canned
/// responses. Unknown routes get a 404 with an HTML body.
#[derive(Debug)]
pub struct HttpStub {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    accept_task: JoinHandle<()>,
}

impl HttpStub {
    pub async fn start(routes: Vec<(&str, StubResponse)>) -> TestResult<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://127.0.0.1:{}", listener.local_addr()?.port());
        let routes: Arc<HashMap<String, StubResponse>> = Arc::new(
            routes
                .into_iter()
                .map(|(key, response)| (key.to_string(), response))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let accept_requests = Arc::clone(&requests);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = Arc::clone(&routes);
                let requests = Arc::clone(&accept_requests);
                tokio::spawn(async move {
                    let _ = serve_one(stream, routes, requests).await;
                });
            }
        });

        Ok(Self {
            url,
            requests,
            accept_task,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }
}

impl Drop for HttpStub {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_one(
    mut stream: TcpStream,
    routes: Arc<HashMap<String, StubResponse>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    requests.lock().await.push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        head: head.clone(),
        body,
    });

    let response = routes
        .get(&format!("{} {}", method, path))
        .cloned()
        .unwrap_or_else(|| StubResponse::json(404, "<html>not found</html>"));

    let mut out = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        reason(response.status),
        response.body.len()
    );
    for (name, value) in &response.headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str("\r\n");
    out.push_str(&response.body);
    stream.write_all(out.as_bytes()).await?;
    stream.shutdown().await
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        302 => "Found",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Status",
    }
}

/// A session over the in-memory server, returned with its transport so tests
/// can inject channel events.
pub struct MockSession {
    pub client: ChatClient,
    pub service: MockChatService,
    pub transport: MockTransport,
    pub handle: JoinHandle<()>,
}

pub async fn mock_session(self_id: UserId, config: ChatlineConfig) -> MockSession {
    let service = MockChatService::new(self_id);
    build_mock_session(self_id, config, service, true)
}

pub async fn mock_session_without_echo(self_id: UserId, config: ChatlineConfig) -> MockSession {
    let service = MockChatService::new(self_id);
    build_mock_session(self_id, config, service, false)
}

fn build_mock_session(
    self_id: UserId,
    config: ChatlineConfig,
    service: MockChatService,
    echo: bool,
) -> MockSession {
    let (events_tx, events_rx) = mpsc::channel(config.event_buffer);
    let mut transport = MockTransport::new(service.clone(), events_tx.clone());
    if !echo {
        transport = transport.without_echo();
    }
    let (client, handle) = ChatClient::spawn(
        self_id,
        &config,
        Arc::new(service.clone()),
        Arc::new(transport.clone()),
        events_tx,
        events_rx,
    );
    MockSession {
        client,
        service,
        transport,
        handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ephemeral_relay_startup() {
        let relay = EphemeralRelay::start().await.expect("Failed to start relay");
        assert!(relay.port > 0);
        assert!(relay.url().starts_with("ws://127.0.0.1:"));
        assert!(!relay.joined(1).await);
    }

    #[tokio::test]
    async fn test_http_stub_serves_routes() {
        let stub = HttpStub::start(vec![("GET /friends", StubResponse::json(200, "[]"))])
            .await
            .expect("Failed to start stub");
        let body = reqwest::get(format!("{}/friends", stub.url()))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "[]");
        assert_eq!(stub.requests().await[0].path, "/friends");
    }
}
