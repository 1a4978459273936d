pub mod types;
pub mod errors;
pub mod config;
pub mod session;
pub mod transport;
pub mod service;
pub mod http_service;
pub mod mock_service;
pub mod client;

// Re-export commonly used types
pub use types::*;
pub use errors::*;
pub use config::ChatlineConfig;
pub use client::{ChatClient, SessionEvent};
pub use service::ChatService;
pub use http_service::HttpChatService;
pub use mock_service::{MockChatService, MockTransport};
pub use session::{
    display_text, ChatSession, Placeholder, SessionSnapshot, ViewEntry,
};
pub use transport::{ChannelEvent, OutboundSend, Transport, WsTransport};
