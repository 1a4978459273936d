use anyhow::{Context, Result};
use chatline_lib::{ChatClient, ChatlineConfig, MockChatService, MockTransport};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use dotenv::{dotenv, from_path};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{env, fs::File, io, path::PathBuf, sync::Arc, sync::Mutex, time::Duration};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod error;
mod theme;
mod ui;

use app::{App, AppResult};

const DEMO_USER_ID: i64 = 1;

#[derive(Parser, Debug)]
#[command(name = "chatline_tui", version, about = "Terminal client for the chatline direct-messaging server")]
struct Args {
    /// Server base URL (overrides CHATLINE_SERVER_URL)
    #[arg(long)]
    server: Option<String>,

    /// Your own user id (overrides CHATLINE_USER_ID)
    #[arg(long)]
    user_id: Option<i64>,

    /// Run against an in-memory server with fake friends
    #[arg(long)]
    demo: bool,
}

fn find_and_load_env() {
    dotenv().ok();

    let mut current_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    loop {
        let env_file = current_dir.join(".env.local");
        if env_file.exists() {
            from_path(&env_file).ok();
            break;
        }
        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => break,
        }
    }
}

/// Log to a file so tracing output never lands on the alternate screen.
fn init_logging() -> Result<PathBuf> {
    let dir = dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("chatline");
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join("chatline_tui.log");
    let file = File::create(&path).with_context(|| format!("Failed to open {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chatline_tui=debug,chatline_lib=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(path)
}

async fn start_client(args: &Args) -> Result<ChatClient> {
    if args.demo {
        let config = ChatlineConfig::default().user_id(DEMO_USER_ID);
        let service = MockChatService::new_with_data(DEMO_USER_ID).await;
        let (tx, rx) = mpsc::channel(config.event_buffer);
        let transport =
            MockTransport::new(service.clone(), tx.clone()).with_auto_reply(Duration::from_millis(700));
        let (client, _session) =
            ChatClient::spawn(DEMO_USER_ID, &config, Arc::new(service), Arc::new(transport), tx, rx);
        return Ok(client);
    }

    let mut config = ChatlineConfig::from_env();
    if let Some(server) = &args.server {
        config.server_url = server.clone();
        config.ws_url = None;
    }
    if let Some(user_id) = args.user_id {
        config.user_id = Some(user_id);
    }
    let (client, _session) = ChatClient::connect(&config)
        .await
        .with_context(|| format!("Failed to connect to {}", config.server_url))?;
    Ok(client)
}

#[tokio::main]
async fn main() -> Result<()> {
    find_and_load_env();
    let args = Args::parse();
    let log_path = init_logging()?;
    info!(log = %log_path.display(), demo = args.demo, "Starting chatline TUI");

    // Connect before touching the terminal so errors print normally.
    let client = start_client(&args).await?;

    enable_raw_mode().map_err(|e| anyhow::anyhow!("Failed to enable raw mode: {}", e))?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)
        .map_err(|e| anyhow::anyhow!("Failed to setup terminal: {}", e))?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal =
        Terminal::new(backend).map_err(|e| anyhow::anyhow!("Failed to create terminal: {}", e))?;

    let mut app = App::new(client);
    app.refresh().await;

    let res = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

async fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        app.sync();
        terminal.draw(|f| ui::draw(f, app))?;

        // Poll with a timeout so session updates are drawn without input.
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match app.handle_key(key).await {
                        AppResult::Continue => {}
                        AppResult::Exit => return Ok(()),
                    }
                }
            }
        }
    }
}
