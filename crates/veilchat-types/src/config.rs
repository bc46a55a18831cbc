//! Node and directory configuration with sensible defaults.
//!
//! All operational parameters are centralized here. Bootstrap binaries
//! fill these structs from CLI flags or a JSON config file; the core
//! never reads the environment itself.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::{Result, Username, VeilchatError};

/// Smallest accepted message frame cap. Anything below this cannot hold
/// a convo-id header plus an AEAD-sealed payload.
const MIN_FRAME_BYTES: usize = 1024;

// ---------------------------------------------------------------------------
// NodeConfig
// ---------------------------------------------------------------------------

/// Configuration for a chat node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Self-declared username registered with the directory.
    pub username: Username,

    /// Host of the rendezvous discovery service.
    pub discovery_host: String,

    /// Port of the rendezvous discovery service.
    pub discovery_port: u16,

    /// Host the node's message listener binds to.
    pub listen_host: String,

    /// Port the node's message listener binds to.
    pub listen_port: u16,

    /// Interval between keepalive + discover cycles, in seconds.
    pub keepalive_interval_secs: u64,

    /// Interval between mute-expiry sweeps, in seconds.
    pub mute_sweep_secs: u64,

    /// Timeout for outbound connections (peer and directory), in seconds.
    pub connect_timeout_secs: u64,

    /// Hard cap on any inbound frame or discovery response, in bytes.
    /// Bounds buffering on unframed connection-delimited reads.
    pub max_frame_bytes: usize,
}

impl NodeConfig {
    /// Creates a config with defaults for everything except identity
    /// and addressing.
    pub fn new(
        username: Username,
        discovery_host: impl Into<String>,
        discovery_port: u16,
        listen_host: impl Into<String>,
        listen_port: u16,
    ) -> Self {
        Self {
            username,
            discovery_host: discovery_host.into(),
            discovery_port,
            listen_host: listen_host.into(),
            listen_port,
            keepalive_interval_secs: 60,
            mute_sweep_secs: 20,
            connect_timeout_secs: 10,
            max_frame_bytes: 64 * 1024,
        }
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.discovery_host.is_empty() {
            return Err(VeilchatError::Config {
                reason: "discovery_host must not be empty".into(),
            });
        }
        if self.listen_host.is_empty() {
            return Err(VeilchatError::Config {
                reason: "listen_host must not be empty".into(),
            });
        }
        if self.keepalive_interval_secs == 0 {
            return Err(VeilchatError::Config {
                reason: "keepalive_interval_secs must be greater than 0".into(),
            });
        }
        if self.mute_sweep_secs == 0 {
            return Err(VeilchatError::Config {
                reason: "mute_sweep_secs must be greater than 0".into(),
            });
        }
        if self.connect_timeout_secs == 0 {
            return Err(VeilchatError::Config {
                reason: "connect_timeout_secs must be greater than 0".into(),
            });
        }
        if self.max_frame_bytes < MIN_FRAME_BYTES {
            return Err(VeilchatError::Config {
                reason: format!("max_frame_bytes must be at least {MIN_FRAME_BYTES}"),
            });
        }
        Ok(())
    }

    /// Directory address as a `host:port` string for connecting.
    pub fn discovery_addr(&self) -> String {
        format!("{}:{}", self.discovery_host, self.discovery_port)
    }

    /// Listener bind address.
    ///
    /// # Errors
    ///
    /// [`VeilchatError::Config`] if host/port do not form a valid
    /// socket address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.listen_host, self.listen_port)
            .parse()
            .map_err(|e| VeilchatError::Config {
                reason: format!("invalid listen address: {e}"),
            })
    }
}

// ---------------------------------------------------------------------------
// DirectoryConfig
// ---------------------------------------------------------------------------

/// Configuration for the discovery service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Host the discovery listener binds to.
    pub bind_host: String,

    /// Port the discovery listener binds to.
    pub bind_port: u16,

    /// Seconds since last keepalive after which a record is reaped.
    pub peer_ttl_secs: u64,

    /// Interval between reaper sweeps, in seconds.
    pub reap_interval_secs: u64,

    /// Hard cap on a single request, in bytes.
    pub max_request_bytes: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".into(),
            bind_port: 8000,
            peer_ttl_secs: 180,
            reap_interval_secs: 60,
            max_request_bytes: 1024,
        }
    }
}

impl DirectoryConfig {
    /// Validates all configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.bind_host.is_empty() {
            return Err(VeilchatError::Config {
                reason: "bind_host must not be empty".into(),
            });
        }
        if self.peer_ttl_secs == 0 {
            return Err(VeilchatError::Config {
                reason: "peer_ttl_secs must be greater than 0".into(),
            });
        }
        if self.reap_interval_secs == 0 {
            return Err(VeilchatError::Config {
                reason: "reap_interval_secs must be greater than 0".into(),
            });
        }
        if self.max_request_bytes == 0 {
            return Err(VeilchatError::Config {
                reason: "max_request_bytes must be greater than 0".into(),
            });
        }
        Ok(())
    }

    /// Listener bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_host, self.bind_port)
            .parse()
            .map_err(|e| VeilchatError::Config {
                reason: format!("invalid bind address: {e}"),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn node_config() -> NodeConfig {
        NodeConfig::new(
            Username::new("alice").expect("valid username"),
            "127.0.0.1",
            8000,
            "127.0.0.1",
            9100,
        )
    }

    #[test]
    fn default_node_config_is_valid() {
        assert!(node_config().validate().is_ok());
    }

    #[test]
    fn default_node_intervals() {
        let config = node_config();
        assert_eq!(config.keepalive_interval_secs, 60);
        assert_eq!(config.mute_sweep_secs, 20);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.max_frame_bytes, 64 * 1024);
    }

    #[test]
    fn zero_keepalive_interval_rejected() {
        let config = NodeConfig {
            keepalive_interval_secs: 0,
            ..node_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_mute_sweep_rejected() {
        let config = NodeConfig {
            mute_sweep_secs: 0,
            ..node_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn tiny_frame_cap_rejected() {
        let config = NodeConfig {
            max_frame_bytes: 128,
            ..node_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_discovery_host_rejected() {
        let config = NodeConfig {
            discovery_host: String::new(),
            ..node_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn discovery_addr_format() {
        assert_eq!(node_config().discovery_addr(), "127.0.0.1:8000");
    }

    #[test]
    fn listen_addr_parses() -> crate::Result<()> {
        let addr = node_config().listen_addr()?;
        assert_eq!(addr.port(), 9100);
        Ok(())
    }

    #[test]
    fn default_directory_config_is_valid() {
        assert!(DirectoryConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_peer_ttl_rejected() {
        let config = DirectoryConfig {
            peer_ttl_secs: 0,
            ..DirectoryConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_reap_interval_rejected() {
        let config = DirectoryConfig {
            reap_interval_secs: 0,
            ..DirectoryConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn node_config_serde_roundtrip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let config = node_config();
        let json = serde_json::to_string(&config)?;
        let parsed: NodeConfig = serde_json::from_str(&json)?;
        assert_eq!(parsed.username.as_str(), "alice");
        assert_eq!(parsed.listen_port, 9100);
        Ok(())
    }
}
