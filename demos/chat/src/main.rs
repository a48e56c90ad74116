//! Terminal chat client built on `beacon-client`.
//!
//! Run a relay first, then:
//!   cargo run -p beacon-demo-chat -- --token dev-token --room course-101
//!
//! Lines typed on stdin are sent as chat messages to the room. Commands:
//!   /join, /leave       enter or leave the room's video call
//!   /react <emoji>      send a video reaction
//!   /dm <id> <text>     send a direct message
//!   /connect            reconnect after the connection was closed for good
//!   /quit               disconnect and exit

use anyhow::Context;
use beacon_client::{
    ClientConfig, ConnectionManager, Envelope, HttpTokenProvider, Message, StaticToken,
    TokenProvider, VideoAction, parse_url,
};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "beacon-chat", about = "Chat over a Beacon connection")]
struct Args {
    /// WebSocket endpoint. Backoff settings come from `BEACON_RECONNECT_BASE_MS`
    /// and `BEACON_MAX_RECONNECT_ATTEMPTS`.
    #[arg(long, env = "BEACON_WS_URL", default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// Fixed connect token.
    #[arg(long, env = "BEACON_TOKEN", conflicts_with = "token_url")]
    token: Option<String>,

    /// REST endpoint that issues connect tokens.
    #[arg(long, env = "BEACON_TOKEN_URL")]
    token_url: Option<url::Url>,

    /// Bearer credential for the token endpoint.
    #[arg(long, env = "BEACON_API_KEY", requires = "token_url")]
    api_key: Option<String>,

    /// Chat room to talk in.
    #[arg(long, default_value = "lobby")]
    room: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("beacon_client=info".parse()?)
                .add_directive("beacon_chat=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = ClientConfig::new(parse_url(&args.url)?).with_env_overrides()?;

    let manager = match (&args.token, &args.token_url) {
        (Some(token), _) => build(config, StaticToken::new(token.parse()?)),
        (None, Some(endpoint)) => {
            let mut provider = HttpTokenProvider::new(endpoint.clone());
            if let Some(key) = &args.api_key {
                provider = provider.with_bearer(key.clone());
            }
            build(config, provider)
        }
        (None, None) => anyhow::bail!("pass --token or --token-url"),
    };

    manager.connect();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else { break };
                if !handle_line(&manager, &args.room, line.trim()) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    manager.disconnect();
    manager.shutdown().await;
    Ok(())
}

fn build(config: ClientConfig, tokens: impl TokenProvider) -> ConnectionManager {
    let manager = ConnectionManager::new(config, tokens);
    manager.on_connection_change(|up| {
        if up {
            println!("* connected");
        } else {
            println!("* disconnected");
        }
    });
    manager.on_message(print_envelope);
    manager
}

/// Returns false when the user asked to quit.
fn handle_line(manager: &ConnectionManager, room: &str, line: &str) -> bool {
    if line == "/quit" {
        return false;
    }
    if line == "/connect" {
        manager.connect();
        return true;
    }
    if line.is_empty() {
        return true;
    }
    if !manager.is_connected() {
        let state = manager.connection_state();
        if state.is_terminal() {
            println!("* not connected ({state}); message dropped, type /connect to retry");
        } else {
            println!("* not connected ({state}); message dropped");
        }
        return true;
    }

    match line.split_once(' ').unwrap_or((line, "")) {
        ("/join", _) => manager.join_video(room),
        ("/leave", _) => manager.leave_video(room),
        ("/react", reaction) if !reaction.is_empty() => manager.send_video_reaction(room, reaction),
        ("/dm", rest) => match rest.split_once(' ') {
            Some((conversation, text)) => manager.send_direct_message(conversation, text),
            None => println!("usage: /dm <conversation> <text>"),
        },
        (command, _) if command.starts_with('/') => println!("unknown command: {command}"),
        _ => manager.send_chat(room, line),
    }
    true
}

fn print_envelope(envelope: &Envelope) {
    let at = envelope.sent_at.format("%H:%M:%S");
    match &envelope.message {
        Message::Chat(chat) => {
            let from = chat.sender_id.as_deref().unwrap_or("?");
            println!("[{at}] #{} <{from}> {}", chat.room_id, chat.content);
        }
        Message::Direct(dm) => {
            let from = dm.sender_id.as_deref().unwrap_or("?");
            println!("[{at}] dm:{} <{from}> {}", dm.conversation_id, dm.content);
        }
        Message::Notification(note) => println!("[{at}] ! {}: {}", note.title, note.message),
        Message::Video(signal) => match &signal.action {
            VideoAction::Chat { message } => println!("[{at}] video #{}: {message}", signal.room_id),
            VideoAction::Reaction { reaction } => {
                println!("[{at}] video #{}: {reaction}", signal.room_id)
            }
            action => println!("[{at}] video #{}: {}", signal.room_id, action.name()),
        },
        Message::Unknown { kind, .. } => tracing::debug!(kind = %kind, "ignoring envelope"),
    }
}
