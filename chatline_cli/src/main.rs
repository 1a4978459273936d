use chatline_lib::{
    display_text, ChatClient, ChatMessage, ChatService, ChatlineConfig, HttpChatService, MessageKind,
    Placeholder, RequestAction, SessionSnapshot, UserId, ViewEntry,
};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use dotenv::{dotenv, from_path};
use std::{env, path::PathBuf, time::Duration};
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Error, Debug)]
enum CliError {
    #[error("{0}")]
    Chatline(#[from] chatline_lib::ChatlineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tracing error: {0}")]
    Tracing(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("{0}")]
    General(String),
}

fn find_and_load_env() {
    // First try the standard dotenv() which looks for .env in current dir
    dotenv().ok();

    // Then walk up the directory tree looking for .env.local
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

fn friend_arg() -> Arg {
    Arg::new("friend")
        .long("friend")
        .value_name("ID")
        .help("User id of the friend")
        .value_parser(value_parser!(i64))
        .required(true)
}

fn timeout_arg(default: &'static str) -> Arg {
    Arg::new("timeout")
        .long("timeout")
        .value_name("SECS")
        .help("Seconds to wait")
        .value_parser(value_parser!(u64))
        .default_value(default)
}

fn cli() -> Command {
    Command::new("chatline_cli")
        .version("0.1.0")
        .about("Command line client for the chatline direct-messaging server")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("server")
                .long("server")
                .value_name("URL")
                .help("Server base URL (overrides CHATLINE_SERVER_URL)")
                .global(true),
        )
        .arg(
            Arg::new("user-id")
                .long("user-id")
                .value_name("ID")
                .help("Your own user id (overrides CHATLINE_USER_ID)")
                .value_parser(value_parser!(i64))
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("history")
                .about("Prints the conversation history with a friend")
                .arg(friend_arg()),
        )
        .subcommand(
            Command::new("send")
                .about("Sends a message and waits for the server to confirm it")
                .arg(friend_arg())
                .arg(
                    Arg::new("message")
                        .long("message")
                        .help("Text of the message")
                        .required(true),
                )
                .arg(timeout_arg("10")),
        )
        .subcommand(
            Command::new("search")
                .about("Sends a friend request to a user found by email or username")
                .arg(
                    Arg::new("term")
                        .long("term")
                        .help("Email or username")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("respond")
                .about("Accepts or declines an incoming friend request")
                .arg(
                    Arg::new("request-id")
                        .long("request-id")
                        .value_name("ID")
                        .value_parser(value_parser!(i64))
                        .required(true),
                )
                .arg(
                    Arg::new("action")
                        .long("action")
                        .value_parser(["accept", "decline"])
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("friends")
                .about("Lists friends and incoming friend requests")
                .long_about(
                    "Lists friends and incoming friend requests.\n\n\
                     Reads the JSON routes GET /friends and GET /friend_requests. A server \
                     that only renders these lists into its /chat page answers 404, which \
                     is reported as a transport error.",
                ),
        )
        .subcommand(
            Command::new("listen")
                .about("Prints messages of one conversation as they arrive")
                .arg(friend_arg())
                .arg(timeout_arg("0").help("Stop after this many seconds (0 = until Ctrl+C)")),
        )
}

fn config_from(matches: &ArgMatches) -> ChatlineConfig {
    let mut config = ChatlineConfig::from_env();
    if let Some(server) = matches.get_one::<String>("server") {
        config.server_url = server.clone();
        // An explicit server also decides the channel endpoint.
        config.ws_url = None;
    }
    if let Some(user_id) = matches.get_one::<i64>("user-id") {
        config.user_id = Some(*user_id);
    }
    config
}

async fn http_service(config: &ChatlineConfig) -> Result<HttpChatService, CliError> {
    let service = HttpChatService::new(&config.server_url)?;
    if let (Some(email), Some(password)) = (&config.email, &config.password) {
        service.login(email, password).await?;
    }
    Ok(service)
}

fn print_message(message: &ChatMessage, self_id: UserId) {
    let who = match message.kind_for(self_id) {
        MessageKind::Sent => "you".to_string(),
        MessageKind::Received => format!("#{}", message.sender_id),
    };
    println!(
        "[{}] {}: {}",
        display_text(&message.timestamp),
        who,
        display_text(&message.body)
    );
}

fn confirmed_sent_count(snapshot: &SessionSnapshot, body: &str) -> usize {
    snapshot
        .entries
        .iter()
        .filter(|e| matches!(e, ViewEntry::Confirmed { kind: MessageKind::Sent, .. }) && e.body() == body)
        .count()
}

/// Select `friend_id` and wait for its history to settle.
async fn open_conversation(
    client: &ChatClient,
    friend_id: UserId,
    timeout: Duration,
) -> Result<SessionSnapshot, CliError> {
    client.select(friend_id, format!("#{}", friend_id)).await?;
    let snapshot = client
        .wait_for(timeout, |s| {
            s.active.as_ref().map(|t| t.friend_id) == Some(friend_id)
                && s.placeholder != Some(Placeholder::Loading)
        })
        .await
        .ok_or_else(|| CliError::General("timed out loading history".into()))?;

    match &snapshot.placeholder {
        Some(Placeholder::ServiceError(reason)) => Err(CliError::General(display_text(reason))),
        Some(Placeholder::TransportError) => Err(CliError::General(Placeholder::TransportError.text())),
        _ => Ok(snapshot),
    }
}

async fn run() -> Result<(), CliError> {
    find_and_load_env();
    let matches = cli().get_matches();

    let level = if matches.get_flag("verbose") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = config_from(&matches);

    match matches.subcommand() {
        Some(("history", sub_matches)) => {
            let friend_id = *sub_matches
                .get_one::<i64>("friend")
                .ok_or_else(|| CliError::General("--friend is required".into()))?;
            let self_id = config.require_user_id()?;
            let service = http_service(&config).await?;

            let messages = service.load_history(friend_id).await?;
            if messages.is_empty() {
                println!("{}", Placeholder::Empty.text());
            }
            for message in &messages {
                print_message(message, self_id);
            }
        }
        Some(("send", sub_matches)) => {
            let friend_id = *sub_matches
                .get_one::<i64>("friend")
                .ok_or_else(|| CliError::General("--friend is required".into()))?;
            let body = sub_matches
                .get_one::<String>("message")
                .map(|m| m.trim().to_string())
                .unwrap_or_default();
            if body.is_empty() {
                return Err(CliError::General("message is empty".into()));
            }
            let timeout = Duration::from_secs(*sub_matches.get_one::<u64>("timeout").unwrap_or(&10));

            let (client, _session) = ChatClient::connect(&config).await?;
            let loaded = open_conversation(&client, friend_id, config.history_timeout).await?;
            let before = confirmed_sent_count(&loaded, &body);

            client.compose(body.clone()).await?;
            let confirmed = client
                .wait_for(timeout, |s| {
                    s.pending_count == 0 && confirmed_sent_count(s, &body) > before
                })
                .await;
            client.shutdown().await.ok();

            match confirmed {
                Some(_) => println!("Message delivered to #{}", friend_id),
                None => {
                    return Err(CliError::General(format!(
                        "message still pending: no confirmation within {}s",
                        timeout.as_secs()
                    )))
                }
            }
        }
        Some(("search", sub_matches)) => {
            let term = sub_matches
                .get_one::<String>("term")
                .map(String::as_str)
                .unwrap_or_default();
            chatline_lib::service::validate_search_term(term)?;
            let service = http_service(&config).await?;
            let reply = service.search_friend(term).await?;
            println!("{}", display_text(&reply));
        }
        Some(("respond", sub_matches)) => {
            let request_id = *sub_matches
                .get_one::<i64>("request-id")
                .ok_or_else(|| CliError::General("--request-id is required".into()))?;
            let action: RequestAction = sub_matches
                .get_one::<String>("action")
                .map(String::as_str)
                .unwrap_or_default()
                .parse()?;
            let service = http_service(&config).await?;
            let reply = service.handle_friend_request(request_id, action).await?;
            println!("{}", display_text(&reply));
        }
        Some(("friends", _)) => {
            let service = http_service(&config).await?;
            let friends = service.friends().await?;
            if friends.is_empty() {
                println!("No friends yet.");
            } else {
                println!("Friends:");
                for friend in friends {
                    println!("  #{} {}", friend.id, display_text(&friend.username));
                }
            }

            let requests = service.friend_requests().await?;
            if !requests.is_empty() {
                println!("\nIncoming requests:");
                for request in requests {
                    println!(
                        "  request {} from #{} {}",
                        request.request_id,
                        request.from_id,
                        display_text(&request.from_username)
                    );
                }
            }
        }
        Some(("listen", sub_matches)) => {
            let friend_id = *sub_matches
                .get_one::<i64>("friend")
                .ok_or_else(|| CliError::General("--friend is required".into()))?;
            let seconds = *sub_matches.get_one::<u64>("timeout").unwrap_or(&0);
            let self_id = config.require_user_id()?;

            let (client, _session) = ChatClient::connect(&config).await?;
            let loaded = open_conversation(&client, friend_id, config.history_timeout).await?;
            let mut printed = loaded.entries.len();
            println!("Listening to #{} ({} earlier messages)", friend_id, printed);

            let mut updates = client.subscribe();
            let deadline = async {
                if seconds == 0 {
                    std::future::pending::<()>().await
                } else {
                    tokio::time::sleep(Duration::from_secs(seconds)).await
                }
            };
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = updates.borrow_and_update().clone();
                        if snapshot.entries.len() < printed {
                            printed = 0;
                        }
                        for entry in &snapshot.entries[printed..] {
                            if let ViewEntry::Confirmed { message, .. } = entry {
                                print_message(message, self_id);
                            }
                        }
                        printed = snapshot.entries.len();
                    }
                    _ = &mut deadline => break,
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            client.shutdown().await.ok();
        }
        _ => unreachable!(),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
