//! Node lifecycle and state machine.
//!
//! The [`ChatNode`] is the public entry point for the client runtime.
//! It owns all subsystems and drives three long-lived background tasks.
//!
//! # State machine
//!
//! ```text
//! Idle ──bind()──▶ Listening ──start()──▶ Running ──shutdown()──▶ (stopped)
//! ```
//!
//! - `Idle` — components created, no socket bound.
//! - `Listening` — message listener bound, background tasks not started.
//! - `Running` — listener, keepalive/discover loop, and mute sweep
//!   active. Terminal only on process shutdown.
//!
//! Out-of-order transitions are rejected with a `Config` error.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use veilchat_crypto::key::ChatKey;
use veilchat_storage::messages::MessageLog;
use veilchat_types::config::NodeConfig;
use veilchat_types::{ConvoId, NodeEvent, Result, Username, VeilchatError};

use crate::discovery_client::{self, DiscoveryClient};
use crate::incoming;
use crate::moderation::{Direction, ModerationState};
use crate::outgoing::{self, SendOutcome};
use crate::peer_table::PeerTable;
use crate::transport::MessageTransport;

/// Bounded node event channel capacity. Events are advisory; a lagging
/// embedder loses events rather than blocking the message paths.
const EVENT_CHANNEL_SIZE: usize = 256;

// ---------------------------------------------------------------------------
// NodeState
// ---------------------------------------------------------------------------

/// Lifecycle state of the node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// Components created, no socket bound.
    Idle,
    /// Listener bound, background tasks not started.
    Listening,
    /// All background tasks active.
    Running,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Listening => write!(f, "listening"),
            Self::Running => write!(f, "running"),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeContext (internal)
// ---------------------------------------------------------------------------

/// Shared state handed to the background tasks.
///
/// Not exported — only [`ChatNode`] and the task modules access this.
pub(crate) struct NodeContext {
    pub(crate) config: NodeConfig,
    pub(crate) table: PeerTable,
    pub(crate) moderation: ModerationState,
    pub(crate) log: MessageLog,
    pub(crate) transport: MessageTransport,
    pub(crate) discovery: DiscoveryClient,
    pub(crate) event_tx: mpsc::Sender<NodeEvent>,
}

// ---------------------------------------------------------------------------
// ChatNode
// ---------------------------------------------------------------------------

/// One user's chat runtime.
///
/// After construction via [`ChatNode::new`], call [`bind`](Self::bind)
/// and then [`start`](Self::start). Conversations and moderation can
/// be changed in any state; sending requires `Running`.
pub struct ChatNode {
    state: NodeState,
    ctx: Arc<NodeContext>,
    /// Bound listener, present only in the `Listening` state.
    listener: Option<TcpListener>,
    /// Event receiver until taken by the embedder.
    event_rx: Option<mpsc::Receiver<NodeEvent>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChatNode {
    /// Creates a node with all subsystems initialized.
    ///
    /// # Errors
    ///
    /// [`VeilchatError::Config`] if the configuration is invalid.
    pub fn new(config: NodeConfig, log: MessageLog) -> Result<Self> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let discovery = DiscoveryClient::new(
            config.discovery_addr(),
            config.username.clone(),
            config.listen_port,
            connect_timeout,
            config.max_frame_bytes,
        );
        let ctx = NodeContext {
            table: PeerTable::new(config.username.clone()),
            moderation: ModerationState::new(),
            log,
            transport: MessageTransport::new(connect_timeout, config.max_frame_bytes),
            discovery,
            config,
            event_tx,
        };

        Ok(Self {
            state: NodeState::Idle,
            ctx: Arc::new(ctx),
            listener: None,
            event_rx: Some(event_rx),
            shutdown_tx,
            shutdown_rx,
            tasks: Vec::new(),
        })
    }

    /// Binds the message listener. Transitions `Idle → Listening`.
    ///
    /// # Errors
    ///
    /// [`VeilchatError::Config`] if the node is not `Idle`,
    /// [`VeilchatError::Network`] if the bind fails.
    pub async fn bind(&mut self) -> Result<()> {
        if self.state != NodeState::Idle {
            return Err(VeilchatError::Config {
                reason: format!("cannot bind in state '{}'; expected 'idle'", self.state),
            });
        }

        let addr = self.ctx.config.listen_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| VeilchatError::Network {
                reason: format!("failed to bind listener on {addr}: {e}"),
            })?;

        // Publish the real port in case the config asked for an
        // ephemeral one.
        if let Ok(local) = listener.local_addr() {
            self.ctx.discovery.set_listen_port(local.port());
            tracing::info!(addr = %local, "message listener bound");
        }
        self.listener = Some(listener);
        self.state = NodeState::Listening;
        Ok(())
    }

    /// Spawns the background tasks. Transitions `Listening → Running`.
    ///
    /// # Errors
    ///
    /// [`VeilchatError::Config`] if the node is not `Listening`
    /// (prevents double-start and start-before-bind).
    pub fn start(&mut self) -> Result<()> {
        if self.state != NodeState::Listening {
            return Err(VeilchatError::Config {
                reason: format!(
                    "cannot start in state '{}'; expected 'listening'",
                    self.state
                ),
            });
        }
        let listener = self.listener.take().ok_or_else(|| VeilchatError::Config {
            reason: "listener missing (double start?)".into(),
        })?;

        self.tasks.push(tokio::spawn(incoming::run_listener(
            listener,
            Arc::clone(&self.ctx),
            self.shutdown_rx.clone(),
        )));
        self.tasks.push(tokio::spawn(discovery_client::run_refresh_loop(
            Arc::clone(&self.ctx),
            self.shutdown_rx.clone(),
        )));
        self.tasks.push(tokio::spawn(run_sweep_loop(
            Arc::clone(&self.ctx),
            self.shutdown_rx.clone(),
        )));

        self.state = NodeState::Running;
        tracing::info!(username = %self.ctx.config.username, "node running");
        Ok(())
    }

    /// Signals all background tasks to exit and waits for them.
    ///
    /// Idempotent once running; rejected before `start`.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state != NodeState::Running {
            return Err(VeilchatError::Config {
                reason: format!("cannot shutdown in state '{}'", self.state),
            });
        }

        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        tracing::info!("node stopped");
        Ok(())
    }

    // -- conversations ------------------------------------------------------

    /// Registers a conversation (shared key + counterpart).
    pub fn add_conversation(&self, key: ChatKey, peer: Username) -> Result<ConvoId> {
        self.ctx.table.add_conversation(key, peer)
    }

    // -- messaging ----------------------------------------------------------

    /// Sends a message to a conversation counterpart.
    ///
    /// Moderation suppression is a quiet [`SendOutcome::Suppressed`],
    /// not an error. Requires the `Running` state.
    pub async fn send_message(&self, recipient: &Username, text: &str) -> Result<SendOutcome> {
        if self.state != NodeState::Running {
            return Err(VeilchatError::Config {
                reason: format!("cannot send in state '{}'", self.state),
            });
        }
        outgoing::send_message(&self.ctx, recipient, text).await
    }

    // -- moderation ---------------------------------------------------------

    /// Blocks a peer in both directions.
    pub fn block(&self, user: &Username) {
        self.ctx.moderation.block(user);
    }

    /// Unblocks a peer.
    pub fn unblock(&self, user: &Username) {
        self.ctx.moderation.unblock(user);
    }

    /// Temporarily mutes outbound sends to a peer.
    pub fn mute(&self, user: &Username, duration: Duration) {
        self.ctx.moderation.mute(user, duration);
    }

    /// Lifts a mute (a block, if any, stays).
    pub fn unmute(&self, user: &Username) {
        self.ctx.moderation.unmute(user);
    }

    /// Whether a message would currently pass the moderation gate.
    pub fn is_deliverable(&self, user: &Username, direction: Direction) -> bool {
        self.ctx.moderation.is_deliverable(user, direction)
    }

    // -- introspection ------------------------------------------------------

    /// Takes the event receiver (can only be taken once).
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<NodeEvent>> {
        self.event_rx.take()
    }

    /// The listener's actual bound address (useful when the configured
    /// port was 0). Present only in the `Listening` state.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> NodeState {
        self.state
    }
}

// ---------------------------------------------------------------------------
// Mute sweep loop
// ---------------------------------------------------------------------------

/// Removes expired mutes on a fixed interval.
///
/// The delivery check also evaluates expiry lazily, so this sweep is
/// bookkeeping, not correctness: a missed tick cannot leave a peer
/// incorrectly gated.
async fn run_sweep_loop(ctx: Arc<NodeContext>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(Duration::from_secs(ctx.config.mute_sweep_secs));

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let lifted = ctx.moderation.sweep_expired();
                if lifted > 0 {
                    tracing::debug!(lifted, "expired mutes swept");
                }
            }

            changed = shutdown_rx.changed() => {
                // A dropped sender counts as shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::debug!("sweep loop exiting");
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
