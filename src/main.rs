//! Console chat against a running Voxta server.
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and the command line.
//! 2. Connecting and authenticating.
//! 3. Resuming the requested chat, or starting one.
//! 4. Streaming character replies to stdout while reading user turns from stdin.

use anyhow::Context;
use clap::Parser;
use std::{collections::HashMap, io::Write};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};
use uuid::Uuid;
use voxta_realtime::{ChatEvent, ClientConfig, ReplyOutcome, VoxtaClient, WaitOptions};
use voxta_types::{
    Guid,
    client::{ResumeChat, StartChat},
};

#[derive(Parser, Debug)]
#[command(version, about = "Console chat client for a Voxta server")]
struct Args {
    /// Server origin, overrides VOXTA_URL.
    #[arg(long)]
    url: Option<String>,
    /// Chat to resume.
    #[arg(long)]
    chat_id: Option<Uuid>,
    /// Character to start a new chat with when no chat id is given.
    #[arg(long)]
    character_id: Option<Uuid>,
    /// Used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let args = Args::parse();
    let mut config = ClientConfig::from_env().context("Failed to load configuration")?;
    if let Some(url) = args.url {
        config.base_url = url;
    }

    // --- 2. Initialize Logging ---
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::rfc_3339())
        .init();
    info!(base_url = %config.base_url, client = %config.client_name, "Configuration loaded");

    // --- 3. Connect and Authenticate ---
    let client = VoxtaClient::connect_to(config);
    let welcome = client
        .connect_and_authenticate()
        .await
        .context("Failed to connect to the Voxta server")?;
    info!(user = %welcome.user.name, "Signed in");

    // --- 4. Resume or Start a Chat ---
    let started = match (args.chat_id, args.character_id) {
        (Some(chat_id), _) => client
            .resume_chat_and_wait(ResumeChat::new(chat_id), WaitOptions::default())
            .await
            .context("Failed to resume chat")?,
        (None, Some(character_id)) => client
            .start_chat_and_wait(StartChat::with_character(character_id), WaitOptions::default())
            .await
            .context("Failed to start chat")?,
        (None, None) => {
            let characters = client
                .load_characters_list_and_wait(WaitOptions::default())
                .await
                .context("Failed to load characters")?;
            let character = characters
                .first()
                .context("The server has no characters to chat with")?;
            info!(character = %character.name, "No chat given, starting one with the first character");
            client
                .start_chat_and_wait(StartChat::with_character(character.id), WaitOptions::default())
                .await
                .context("Failed to start chat")?
        }
    };
    let session_id = started.session_id;
    let names: HashMap<Guid, String> = started
        .characters
        .iter()
        .map(|character| (character.id, character.name.clone()))
        .collect();
    info!(%session_id, chat_id = %started.chat_id, "Chat ready. Type a message, /interrupt, /retry or /quit.");

    // --- 5. Stream Replies ---
    let mut chat_events = client.chat_events();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        loop {
            match chat_events.recv().await {
                Ok(ChatEvent::ReplyStarted {
                    session_id: s,
                    sender_id,
                    ..
                }) if s == session_id => {
                    let name = sender_id
                        .and_then(|id| names.get(&id))
                        .map(String::as_str)
                        .unwrap_or("Character");
                    print!("{}: ", name);
                    let _ = stdout.flush();
                }
                Ok(ChatEvent::ReplyDelta {
                    session_id: s,
                    fragment,
                    ..
                }) if s == session_id => {
                    print!("{}", fragment.text);
                    let _ = stdout.flush();
                }
                Ok(ChatEvent::ReplyCompleted(reply)) if reply.session_id == session_id => {
                    match reply.outcome {
                        ReplyOutcome::Ended => println!(),
                        outcome => println!(" [{:?}]", outcome),
                    }
                }
                Ok(ChatEvent::SessionError {
                    message, retryable, ..
                }) => warn!(%message, retryable, "Chat error"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Fell behind on chat events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // --- 6. Read User Turns ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C");
                None
            }
        };
        let Some(line) = line else {
            break;
        };
        match line.trim() {
            "" => {}
            "/quit" => break,
            "/interrupt" => client.interrupt(session_id).await?,
            "/retry" => client.retry(session_id).await?,
            text => client
                .send_text(session_id, text)
                .await
                .context("Failed to send message")?,
        }
    }

    if let Err(e) = client.stop_chat(session_id).await {
        warn!(error = %e, "Failed to stop chat");
    }
    client.disconnect().await;
    printer.abort();
    info!("Goodbye.");
    Ok(())
}
