use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatlineError {
    /// The remote endpoint answered with a structured `{ "error": .. }` payload.
    #[error("Service error: {0}")]
    Service(String),

    /// The request or channel frame could not be delivered at all.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session channel closed")]
    ChannelClosed,
}

impl ChatlineError {
    /// True when the server was reached and reported a failure of its own.
    pub fn is_service_error(&self) -> bool {
        matches!(self, ChatlineError::Service(_))
    }

    /// True when the request never completed (network, framing, decoding).
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            ChatlineError::Transport(_)
                | ChatlineError::Http(_)
                | ChatlineError::WebSocket(_)
                | ChatlineError::Serialization(_)
                | ChatlineError::Io(_)
                | ChatlineError::ChannelClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, ChatlineError>;
