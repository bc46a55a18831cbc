//! Discovery request parse and encode.
//!
//! A request is a single framed line:
//!
//! ```text
//! DISCOVER:<username>
//! KEEPALIVE:<username>
//! KEEPALIVE:<username>:<port>
//! ```
//!
//! The three-field keepalive advertises the sender's listening port;
//! the host half of the registered address is always the address the
//! service observes on the connection, never client-asserted. The
//! two-field form stays parseable for older clients and falls back to
//! the observed source port.

use veilchat_types::{Result, Username, VeilchatError};

// ---------------------------------------------------------------------------
// DirectoryRequest
// ---------------------------------------------------------------------------

/// A parsed discovery request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DirectoryRequest {
    /// Ask for the full membership snapshot.
    Discover {
        /// Username of the requesting peer (informational only; a
        /// discover does not modify directory state).
        username: Username,
    },
    /// Register or refresh the sender's directory entry.
    Keepalive {
        /// Username to register.
        username: Username,
        /// Advertised listening port; `None` means the service uses
        /// the connection's observed source port.
        listen_port: Option<u16>,
    },
}

impl DirectoryRequest {
    /// Parses a request line (without the trailing newline).
    ///
    /// # Errors
    ///
    /// [`VeilchatError::Protocol`] on a missing separator, unknown
    /// command, invalid username, or unparseable port.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (command, rest) = line.split_once(':').ok_or_else(|| {
            VeilchatError::Protocol {
                reason: "request missing ':' separator".into(),
            }
        })?;

        match command {
            "DISCOVER" => {
                let username = rest.parse()?;
                Ok(Self::Discover { username })
            }
            "KEEPALIVE" => match rest.split_once(':') {
                None => {
                    let username = rest.parse()?;
                    Ok(Self::Keepalive {
                        username,
                        listen_port: None,
                    })
                }
                Some((name, port)) => {
                    let username = name.parse()?;
                    let listen_port =
                        port.parse::<u16>().map_err(|_| VeilchatError::Protocol {
                            reason: format!("invalid advertised port: {port:?}"),
                        })?;
                    Ok(Self::Keepalive {
                        username,
                        listen_port: Some(listen_port),
                    })
                }
            },
            other => Err(VeilchatError::Protocol {
                reason: format!("unknown command: {other:?}"),
            }),
        }
    }

    /// Encodes the request as a wire line (no trailing newline).
    pub fn encode(&self) -> String {
        match self {
            Self::Discover { username } => format!("DISCOVER:{username}"),
            Self::Keepalive {
                username,
                listen_port: None,
            } => format!("KEEPALIVE:{username}"),
            Self::Keepalive {
                username,
                listen_port: Some(port),
            } => format!("KEEPALIVE:{username}:{port}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
