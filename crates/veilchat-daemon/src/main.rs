//! Veilchat Daemon -- encrypted P2P chat node with a console interface.
//!
//! Usage:
//!
//!   veilchat-daemon [OPTIONS]
//!
//! Options:
//!
//!   --username <NAME>        Username registered with the directory
//!   --discovery <HOST:PORT>  Rendezvous directory address (default: 127.0.0.1:8000)
//!   --listen <HOST:PORT>     Message listener address (default: 0.0.0.0:9100)
//!   --data-dir <PATH>        Data directory (default: platform-specific)
//!   --keepalive-interval <S> Seconds between directory refreshes
//!   --config <PATH>          Load config from JSON file
//!
//! Conversation keys come from the config file only; see
//! [`config::DaemonConfigFile`] for the format. Once running, the
//! daemon reads chat commands from stdin and runs until `quit` or
//! Ctrl+C.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use veilchat_crypto::key::ChatKey;
use veilchat_node::node::ChatNode;
use veilchat_node::outgoing::SendOutcome;
use veilchat_storage::engine::StorageEngine;
use veilchat_storage::messages::MessageLog;
use veilchat_types::config::NodeConfig;
use veilchat_types::{NodeEvent, Username};

mod config;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const STORAGE_DIR: &str = "storage";

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    // Tracing / logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Parse CLI arguments.
    let cli = config::CliArgs::parse_from_env();

    // Load or merge config file if provided.
    let daemon_config = match &cli.config_path {
        Some(path) => match config::DaemonConfig::load(path) {
            Ok(cfg) => cfg.merge_cli(&cli),
            Err(e) => {
                tracing::error!("failed to load config file: {e}");
                std::process::exit(1);
            }
        },
        None => config::DaemonConfig::from_cli(&cli),
    };

    // Run the daemon.
    if let Err(e) = run_daemon(daemon_config).await {
        tracing::error!("daemon error: {e}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Daemon main logic
// ---------------------------------------------------------------------------

async fn run_daemon(cfg: config::DaemonConfig) -> Result<(), String> {
    // -----------------------------------------------------------------------
    // 1. Identity and addressing
    // -----------------------------------------------------------------------

    let username: Username = cfg
        .username
        .as_deref()
        .ok_or("a username is required (--username or config file)")?
        .parse()
        .map_err(|e| format!("invalid username: {e}"))?;

    let (discovery_host, discovery_port) = config::split_host_port(&cfg.discovery)
        .map_err(|e| format!("invalid --discovery address: {e}"))?;
    let (listen_host, listen_port) = config::split_host_port(&cfg.listen)
        .map_err(|e| format!("invalid --listen address: {e}"))?;

    let mut node_config = NodeConfig::new(
        username.clone(),
        discovery_host,
        discovery_port,
        listen_host,
        listen_port,
    );
    if let Some(interval) = cfg.keepalive_interval {
        node_config.keepalive_interval_secs = interval;
    }

    // -----------------------------------------------------------------------
    // 2. Storage
    // -----------------------------------------------------------------------

    let storage_path = cfg.data_dir.join(STORAGE_DIR);
    std::fs::create_dir_all(&storage_path)
        .map_err(|e| format!("failed to create data directory: {e}"))?;

    let storage = StorageEngine::open(&storage_path)
        .map_err(|e| format!("failed to open storage: {e}"))?;
    let log = storage
        .messages()
        .map_err(|e| format!("failed to open message log: {e}"))?;

    tracing::info!(data_dir = %cfg.data_dir.display(), "storage engine opened");

    // -----------------------------------------------------------------------
    // 3. Node
    // -----------------------------------------------------------------------

    let mut node =
        ChatNode::new(node_config, log.clone()).map_err(|e| format!("node creation failed: {e}"))?;

    for seed in &cfg.conversations {
        let peer: Username = seed
            .peer
            .parse()
            .map_err(|e| format!("invalid peer name '{}': {e}", seed.peer))?;
        let key = ChatKey::decode(&seed.key)
            .map_err(|e| format!("invalid key for '{}': {e}", seed.peer))?;
        let convo_id = node
            .add_conversation(key, peer.clone())
            .map_err(|e| format!("conversation with '{peer}' rejected: {e}"))?;
        tracing::info!(%peer, %convo_id, "conversation loaded");
    }

    node.bind().await.map_err(|e| format!("bind failed: {e}"))?;
    let events = node
        .take_event_receiver()
        .ok_or("event receiver already taken")?;
    node.start().map_err(|e| format!("node start failed: {e}"))?;

    tracing::info!(%username, discovery = %cfg.discovery, listen = %cfg.listen, "node running");

    // -----------------------------------------------------------------------
    // 4. Event printer + console loop
    // -----------------------------------------------------------------------

    tokio::spawn(print_events(events, log));

    run_console(&mut node).await;

    node.shutdown()
        .await
        .map_err(|e| format!("shutdown failed: {e}"))?;
    storage
        .flush()
        .map_err(|e| format!("final flush failed: {e}"))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Event printer
// ---------------------------------------------------------------------------

/// Turns node events into console output. Received message bodies are
/// read back from the log, since events carry attribution only.
async fn print_events(
    mut events: tokio::sync::mpsc::Receiver<NodeEvent>,
    log: MessageLog,
) {
    while let Some(event) = events.recv().await {
        match event {
            NodeEvent::MessageReceived { convo_id, sender } => {
                let body = log
                    .count(&convo_id)
                    .and_then(|n| log.messages_for(&convo_id, 1, (n as usize).saturating_sub(1)))
                    .ok()
                    .and_then(|mut page| page.pop())
                    .map(|m| m.body)
                    .unwrap_or_default();
                println!("[{sender}] {body}");
            }
            NodeEvent::MessageSuppressed { recipient } => {
                println!("(not sent: {recipient} is blocked or muted)");
            }
            NodeEvent::DeliveryFailed { recipient, reason } => {
                println!("(delivery to {recipient} failed: {reason})");
            }
            NodeEvent::IntegrityFailed { convo_id, addr } => {
                tracing::warn!(%addr, %convo_id, "dropped a message that failed decryption");
            }
            NodeEvent::UnrecognizedSender { addr } => {
                tracing::warn!(%addr, "dropped message for an unknown conversation");
            }
            NodeEvent::SnapshotApplied { peers } => {
                tracing::debug!(peers, "peer snapshot applied");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Console loop
// ---------------------------------------------------------------------------

/// Reads chat commands from stdin until `quit`, EOF, or Ctrl+C.
async fn run_console(node: &mut ChatNode) {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_command(node, line.trim()).await {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("stdin read failed: {e}");
                        break;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                println!();
                tracing::info!("interrupt received");
                break;
            }
        }
    }
}

/// Executes one console command. Returns `false` on `quit`.
async fn handle_command(node: &ChatNode, line: &str) -> bool {
    let mut parts = line.splitn(3, ' ');
    let command = parts.next().unwrap_or("");

    match command {
        "" => {}
        "quit" | "exit" => return false,
        "send" => {
            let (Some(user), Some(text)) = (parts.next(), parts.next()) else {
                println!("usage: send <user> <text...>");
                return true;
            };
            match parse_user(user) {
                Some(user) => match node.send_message(&user, text).await {
                    Ok(SendOutcome::Sent) => {}
                    Ok(SendOutcome::Suppressed) => {}
                    Err(e) => println!("(send failed: {e})"),
                },
                None => {}
            }
        }
        "block" => {
            if let Some(user) = parts.next().and_then(parse_user) {
                node.block(&user);
                println!("{user} blocked");
            } else {
                println!("usage: block <user>");
            }
        }
        "unblock" => {
            if let Some(user) = parts.next().and_then(parse_user) {
                node.unblock(&user);
                println!("{user} unblocked");
            } else {
                println!("usage: unblock <user>");
            }
        }
        "mute" => {
            let (Some(user), Some(secs)) = (parts.next(), parts.next()) else {
                println!("usage: mute <user> <secs>");
                return true;
            };
            let (Some(user), Ok(secs)) = (parse_user(user), secs.trim().parse::<u64>()) else {
                println!("usage: mute <user> <secs>");
                return true;
            };
            node.mute(&user, Duration::from_secs(secs));
            println!("{user} muted for {secs}s");
        }
        "unmute" => {
            if let Some(user) = parts.next().and_then(parse_user) {
                node.unmute(&user);
                println!("{user} unmuted");
            } else {
                println!("usage: unmute <user>");
            }
        }
        other => {
            println!("unknown command '{other}' (send, block, unblock, mute, unmute, quit)");
        }
    }
    true
}

fn parse_user(s: &str) -> Option<Username> {
    match s.parse() {
        Ok(user) => Some(user),
        Err(e) => {
            println!("(invalid username: {e})");
            None
        }
    }
}
