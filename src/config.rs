// Node configuration
//
// Defaults mirror the classic ports: HTTP control surface on 8001,
// peer-to-peer listener on 7001.

use crate::transport::{PeerAddress, TcpTransportConfig, TransportConfig, TransportError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_HTTP_PORT: u16 = 8001;
pub const DEFAULT_P2P_PORT: u16 = 7001;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid peer address: {0}")]
    InvalidPeer(String),

    #[error("HTTP and P2P listeners cannot share port {0}")]
    PortClash(u16),

    #[error("Invalid transport configuration: {0}")]
    Transport(#[from] TransportError),
}

/// Everything needed to bring a node up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address the HTTP control surface binds to
    pub http_bind_address: String,
    /// Port of the HTTP control surface
    pub http_port: u16,
    /// Peer-to-peer listener
    pub p2p: TcpTransportConfig,
    /// Peers dialed at startup
    pub initial_peers: Vec<PeerAddress>,
    /// Capacity of the control-surface command queue
    pub command_queue_len: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            http_bind_address: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            p2p: TcpTransportConfig::new()
                .with_bind_address("0.0.0.0")
                .with_bind_port(DEFAULT_P2P_PORT),
            initial_peers: Vec::new(),
            command_queue_len: 64,
        }
    }
}

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http_bind_address(mut self, addr: &str) -> Self {
        self.http_bind_address = addr.to_string();
        self
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    pub fn with_p2p_bind_address(mut self, addr: &str) -> Self {
        self.p2p.bind_address = addr.to_string();
        self
    }

    pub fn with_p2p_port(mut self, port: u16) -> Self {
        self.p2p.bind_port = port;
        self
    }

    pub fn with_transport_config(mut self, base: TransportConfig) -> Self {
        self.p2p.base = base;
        self
    }

    pub fn with_initial_peer(mut self, peer: PeerAddress) -> Self {
        self.initial_peers.push(peer);
        self
    }

    /// Parse and add peers from strings such as `"127.0.0.1:7002"`
    pub fn with_initial_peers<S: AsRef<str>>(mut self, peers: &[S]) -> Result<Self, ConfigError> {
        for peer in peers {
            let peer = peer.as_ref().trim();
            if peer.is_empty() {
                continue;
            }
            let address =
                PeerAddress::parse(peer).map_err(|_| ConfigError::InvalidPeer(peer.to_string()))?;
            self.initial_peers.push(address);
        }
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_port != 0 && self.http_port == self.p2p.bind_port {
            return Err(ConfigError::PortClash(self.http_port));
        }
        self.p2p.base.validate()?;
        Ok(())
    }
}
