//! Local demo shell for the trellis engine.
//!
//! Runs your participant and a handful of echo bots in one process over an
//! in-memory relay; the data channels between them are real WebRTC
//! loopback connections, so the whole negotiation lifecycle is exercised.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use trellis_core::{Identity, RoomId};
use trellis_engine::relay::InMemoryRelay;
use trellis_engine::transport::WebRtcFactory;
use trellis_engine::{Engine, EngineConfig, EngineEvent};

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Peer-mesh chat demo: you plus echo bots over loopback WebRTC")]
struct Cli {
    /// Room to join.
    #[arg(long, default_value = "demo")]
    room: String,

    /// Your nickname; prompted for when omitted.
    #[arg(long)]
    nickname: Option<String>,

    /// Number of echo bots joining the room with you.
    #[arg(long, default_value_t = 1)]
    bots: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let nickname = match cli.nickname {
        Some(n) => n,
        None => dialoguer::Input::new()
            .with_prompt("Nickname")
            .default("anonymous".to_owned())
            .interact_text()?,
    };

    let config = EngineConfig::default();
    let relay = Arc::new(InMemoryRelay::new());
    let transport = Arc::new(WebRtcFactory::new(config.ice_servers.clone()));
    let room = RoomId::from(cli.room.as_str());

    for i in 0..cli.bots {
        spawn_echo_bot(
            config.clone(),
            relay.clone(),
            transport.clone(),
            room.clone(),
            i,
        );
    }

    let identity = Identity::new(Uuid::new_v4().to_string(), nickname);
    let (handle, mut events) = Engine::spawn(config, relay, transport);
    handle.join_room(room, identity).await;

    println!(
        "{}",
        "Type a message and press enter; /quit to leave.".dimmed()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                render(event);
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim() == "/quit" => {
                        handle.leave_room().await;
                        break;
                    }
                    Some(line) if !line.trim().is_empty() => {
                        handle.send_message(line).await;
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        }
    }

    println!("{}", "bye".dimmed());
    Ok(())
}

fn render(event: EngineEvent) {
    match event {
        EngineEvent::RoomJoined { room_id } => {
            println!("{}", format!("* joined room {room_id}").green());
        }
        EngineEvent::RoomLeft { room_id } => {
            println!("{}", format!("* left room {room_id}").yellow());
        }
        EngineEvent::RoomFull { room_id, capacity } => {
            println!(
                "{}",
                format!("* room {room_id} is full (capacity {capacity})").red()
            );
        }
        EngineEvent::UserJoined { member } => {
            println!("{}", format!("* {} joined", member.nickname).green());
        }
        EngineEvent::UserLeft { peer_id } => {
            println!("{}", format!("* {peer_id} left").yellow());
        }
        EngineEvent::PeerConnected { peer_id } => {
            println!("{}", format!("* connected to {peer_id}").cyan());
        }
        EngineEvent::PeerStateChange { .. } => {}
        EngineEvent::ChatMessage { message, is_self } => {
            let line = format!("[{}] {}", message.nickname, message.text);
            if is_self {
                println!("{}", line.dimmed());
            } else {
                println!("{}", line.cyan());
            }
        }
        EngineEvent::Error { kind, detail } => {
            println!("{}", format!("! {kind}: {detail}").red());
        }
    }
}

/// A second engine in the same process that answers every human message.
fn spawn_echo_bot(
    config: EngineConfig,
    relay: Arc<InMemoryRelay>,
    transport: Arc<WebRtcFactory>,
    room: RoomId,
    index: usize,
) {
    tokio::spawn(async move {
        let identity = Identity::new(format!("bot-{}-{}", index, Uuid::new_v4()), format!("echo-bot-{index}"));
        let (handle, mut events) = Engine::spawn(config, relay, transport);
        handle.join_room(room, identity).await;
        while let Some(event) = events.recv().await {
            if let EngineEvent::ChatMessage { message, is_self } = event {
                // Never echo ourselves or other bots, or two bots would
                // volley forever.
                if !is_self && !message.from.as_str().starts_with("bot-") {
                    handle
                        .send_message(format!("echo: {}", message.text))
                        .await;
                }
            }
        }
    });
}
