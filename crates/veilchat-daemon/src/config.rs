//! CLI argument parsing and config file support.
//!
//! The daemon can be configured via CLI flags, a JSON config file,
//! or a combination of both (CLI overrides config file). Conversation
//! keys can only come from the config file — key material does not
//! belong on a command line.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CLI arguments (manual parsing, no clap dependency)
// ---------------------------------------------------------------------------

/// Parsed command-line arguments.
pub struct CliArgs {
    pub username: Option<String>,
    pub discovery: Option<String>,
    pub listen: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub keepalive_interval: Option<u64>,
    pub config_path: Option<PathBuf>,
}

impl CliArgs {
    /// Parses CLI arguments from `std::env::args`.
    pub fn parse_from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut cli = Self {
            username: None,
            discovery: None,
            listen: None,
            data_dir: None,
            keepalive_interval: None,
            config_path: None,
        };

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--username" => {
                    i += 1;
                    cli.username = args.get(i).cloned();
                }
                "--discovery" => {
                    i += 1;
                    cli.discovery = args.get(i).cloned();
                }
                "--listen" => {
                    i += 1;
                    cli.listen = args.get(i).cloned();
                }
                "--data-dir" => {
                    i += 1;
                    cli.data_dir = args.get(i).map(PathBuf::from);
                }
                "--keepalive-interval" => {
                    i += 1;
                    cli.keepalive_interval = args.get(i).and_then(|s| s.parse().ok());
                }
                "--config" => {
                    i += 1;
                    cli.config_path = args.get(i).map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                other => {
                    eprintln!("unknown argument: {other}");
                    eprintln!("use --help for usage information");
                    std::process::exit(1);
                }
            }
            i += 1;
        }

        cli
    }
}

// ---------------------------------------------------------------------------
// Config file (JSON)
// ---------------------------------------------------------------------------

/// One pre-shared conversation from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSeed {
    /// Counterpart username.
    pub peer: String,
    /// Hex-encoded 32-byte chat key, as exchanged out of band.
    pub key: String,
}

/// JSON config file format.
///
/// Example `veilchat.json`:
/// ```json
/// {
///   "username": "alice",
///   "discovery": "203.0.113.1:8000",
///   "listen": "0.0.0.0:9100",
///   "data_dir": "/opt/veilchat/data",
///   "keepalive_interval": 60,
///   "conversations": [
///     { "peer": "bob", "key": "3f2a...64 hex chars...9c" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DaemonConfigFile {
    pub username: Option<String>,
    pub discovery: Option<String>,
    pub listen: Option<String>,
    pub data_dir: Option<String>,
    pub keepalive_interval: Option<u64>,
    pub conversations: Option<Vec<ConversationSeed>>,
}

// ---------------------------------------------------------------------------
// Resolved config (all defaults applied)
// ---------------------------------------------------------------------------

/// Fully resolved daemon configuration with all defaults applied.
pub struct DaemonConfig {
    pub username: Option<String>,
    pub discovery: String,
    pub listen: String,
    pub data_dir: PathBuf,
    pub keepalive_interval: Option<u64>,
    pub conversations: Vec<ConversationSeed>,
}

impl DaemonConfig {
    /// Build config purely from CLI args with defaults.
    pub fn from_cli(cli: &CliArgs) -> Self {
        Self {
            username: cli.username.clone(),
            discovery: cli
                .discovery
                .clone()
                .unwrap_or_else(|| "127.0.0.1:8000".into()),
            listen: cli.listen.clone().unwrap_or_else(|| "0.0.0.0:9100".into()),
            data_dir: cli.data_dir.clone().unwrap_or_else(default_data_dir),
            keepalive_interval: cli.keepalive_interval,
            conversations: Vec::new(),
        }
    }

    /// Load config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file: {e}"))?;

        let file: DaemonConfigFile =
            serde_json::from_str(&text).map_err(|e| format!("invalid config JSON: {e}"))?;

        Ok(Self {
            username: file.username,
            discovery: file.discovery.unwrap_or_else(|| "127.0.0.1:8000".into()),
            listen: file.listen.unwrap_or_else(|| "0.0.0.0:9100".into()),
            data_dir: file
                .data_dir
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
            keepalive_interval: file.keepalive_interval,
            conversations: file.conversations.unwrap_or_default(),
        })
    }

    /// Merge CLI overrides onto a config-file base.
    pub fn merge_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(ref name) = cli.username {
            self.username = Some(name.clone());
        }
        if let Some(ref addr) = cli.discovery {
            self.discovery = addr.clone();
        }
        if let Some(ref addr) = cli.listen {
            self.listen = addr.clone();
        }
        if let Some(ref dir) = cli.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(interval) = cli.keepalive_interval {
            self.keepalive_interval = Some(interval);
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Splits a `host:port` string. The split is on the last colon so
/// bracketed IPv6 hosts survive.
pub fn split_host_port(addr: &str) -> Result<(String, u16), String> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| format!("'{addr}' is not host:port"))?;
    if host.is_empty() {
        return Err(format!("'{addr}' has an empty host"));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| format!("'{port}' is not a valid port"))?;
    Ok((host.to_owned(), port))
}

/// Platform-specific default data directory.
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        if let Some(home) = dirs::home_dir() {
            return home.join(".veilchat");
        }
    }
    if let Some(data) = dirs::data_dir() {
        return data.join("Veilchat");
    }
    PathBuf::from("veilchat-data")
}

fn print_help() {
    println!(
        r#"Veilchat Daemon - encrypted P2P chat node

USAGE:
    veilchat-daemon [OPTIONS]

OPTIONS:
    --username <NAME>          Username registered with the directory
    --discovery <HOST:PORT>    Rendezvous directory address (default: 127.0.0.1:8000)
    --listen <HOST:PORT>       Message listener address (default: 0.0.0.0:9100)
    --data-dir <PATH>          Data directory (default: platform-specific)
    --keepalive-interval <S>   Seconds between directory refreshes (default: 60)
    --config <PATH>            Load settings from JSON config file
    -h, --help                 Show this help

CONSOLE COMMANDS (on stdin once running):
    send <user> <text...>      Send a message to a conversation counterpart
    block <user>               Drop all traffic to and from a user
    unblock <user>             Lift a block
    mute <user> <secs>         Suppress outbound messages for a while
    unmute <user>              Lift a mute early
    quit                       Shut down

EXAMPLES:
    # Talk to bob through a public directory
    veilchat-daemon --username alice --discovery 203.0.113.1:8000 \
        --config /etc/veilchat/alice.json

ENVIRONMENT:
    RUST_LOG                   Log level filter (default: info)
"#
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
