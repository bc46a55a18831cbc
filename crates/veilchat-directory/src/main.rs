//! Veilchat discovery service -- rendezvous point for peers.
//!
//! Usage:
//!
//!   veilchat-directory [OPTIONS]
//!
//! Options:
//!
//!   --bind <HOST>            Bind host (default: 0.0.0.0)
//!   --port <PORT>            Bind port (default: 8000)
//!   --peer-ttl <SECS>        Drop peers silent for this long (default: 180)
//!   --reap-interval <SECS>   Reaper sweep interval (default: 60)
//!   --config <PATH>          Load settings from JSON config file
//!
//! The service runs until interrupted with Ctrl+C.

use std::path::{Path, PathBuf};

use veilchat_directory::service::DiscoveryService;
use veilchat_types::config::DirectoryConfig;

// ---------------------------------------------------------------------------
// CLI arguments (manual parsing, no clap dependency)
// ---------------------------------------------------------------------------

/// Parsed command-line arguments.
struct CliArgs {
    bind: Option<String>,
    port: Option<u16>,
    peer_ttl: Option<u64>,
    reap_interval: Option<u64>,
    config_path: Option<PathBuf>,
}

impl CliArgs {
    /// Parses CLI arguments from `std::env::args`.
    fn parse_from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut cli = Self {
            bind: None,
            port: None,
            peer_ttl: None,
            reap_interval: None,
            config_path: None,
        };

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--bind" => {
                    i += 1;
                    cli.bind = args.get(i).cloned();
                }
                "--port" => {
                    i += 1;
                    cli.port = args.get(i).and_then(|s| s.parse().ok());
                }
                "--peer-ttl" => {
                    i += 1;
                    cli.peer_ttl = args.get(i).and_then(|s| s.parse().ok());
                }
                "--reap-interval" => {
                    i += 1;
                    cli.reap_interval = args.get(i).and_then(|s| s.parse().ok());
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

/// Loads the base config from a JSON file, if given.
fn load_config(path: &Path) -> Result<DirectoryConfig, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read config file: {e}"))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid config JSON: {e}"))
}

/// Applies CLI overrides onto the base config.
fn merge_cli(mut config: DirectoryConfig, cli: &CliArgs) -> DirectoryConfig {
    if let Some(ref bind) = cli.bind {
        config.bind_host = bind.clone();
    }
    if let Some(port) = cli.port {
        config.bind_port = port;
    }
    if let Some(ttl) = cli.peer_ttl {
        config.peer_ttl_secs = ttl;
    }
    if let Some(interval) = cli.reap_interval {
        config.reap_interval_secs = interval;
    }
    config
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = CliArgs::parse_from_env();

    let base = match &cli.config_path {
        Some(path) => match load_config(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!("failed to load config file: {e}");
                std::process::exit(1);
            }
        },
        None => DirectoryConfig::default(),
    };
    let config = merge_cli(base, &cli);

    let (service, shutdown) = match DiscoveryService::bind(config).await {
        Ok(bound) => bound,
        Err(e) => {
            tracing::error!("failed to start discovery service: {e}");
            std::process::exit(1);
        }
    };

    match service.local_addr() {
        Ok(addr) => tracing::info!(%addr, "discovery service listening"),
        Err(e) => tracing::warn!(%e, "could not read bound address"),
    }

    let server = tokio::spawn(service.run());

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(%e, "failed to wait for ctrl-c");
    }
    tracing::info!("interrupt received -- shutting down");
    shutdown.shutdown();
    let _ = server.await;
}

fn print_help() {
    println!(
        r#"Veilchat Discovery Service - rendezvous point for peers

USAGE:
    veilchat-directory [OPTIONS]

OPTIONS:
    --bind <HOST>            Bind host (default: 0.0.0.0)
    --port <PORT>            Bind port (default: 8000)
    --peer-ttl <SECS>        Drop peers silent for this long (default: 180)
    --reap-interval <SECS>   Reaper sweep interval (default: 60)
    --config <PATH>          Load settings from JSON config file
    -h, --help               Show this help

ENVIRONMENT:
    RUST_LOG                 Log level filter (default: info)
"#
    );
}
