use chatline_lib::{ChatClient, ChatlineConfig, MockChatService, MockTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Example 1: Default configuration
    let config = ChatlineConfig::default();
    println!("Default server: {} (channel {})", config.server_url, config.channel_url()?);

    // Example 2: Environment variables
    // Set CHATLINE_SERVER_URL=https://chat.example.com and CHATLINE_USER_ID=1
    let config = ChatlineConfig::from_env();
    println!("From environment: {} user={:?}", config.server_url, config.user_id);

    // Example 3: Builder helpers
    let config = ChatlineConfig::with_server_url("https://chat.example.com")
        .user_id(1)
        .pending_timeout(Duration::from_secs(10));
    println!("Custom channel url: {}", config.channel_url()?);

    // Example 4: Offline session against the in-memory server
    let service = MockChatService::new_with_data(1).await;
    let (events_tx, events_rx) = mpsc::channel(config.event_buffer);
    let transport = MockTransport::new(service.clone(), events_tx.clone());
    let (client, handle) = ChatClient::spawn(
        1,
        &config,
        Arc::new(service),
        Arc::new(transport),
        events_tx,
        events_rx,
    );

    client.select(2, "alice").await?;
    client.compose("Hello from the demo").await?;
    if let Some(snapshot) = client
        .wait_for(Duration::from_secs(2), |s| s.entries.len() == 4 && s.pending_count == 0)
        .await
    {
        for entry in &snapshot.entries {
            println!("[{}] {:?}: {}", entry.timestamp(), entry.kind(), entry.display_body());
        }
    }

    client.shutdown().await?;
    handle.await?;
    Ok(())
}
