// Transport Traits and Core Types
// Defines the abstract Transport trait and the types shared by implementations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

// ============================================================================
// TRANSPORT CONFIG
// ============================================================================

/// Base configuration for the transport layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Maximum number of simultaneous connections
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connection_timeout_secs: u32,
    /// Largest accepted frame in bytes; longer frames are dropped
    pub max_frame_bytes: usize,
    /// Frames queued per connection before further sends are dropped
    pub send_queue_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            connection_timeout_secs: 10,
            max_frame_bytes: 16 * 1024 * 1024,
            send_queue_len: 256,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_connection_timeout(mut self, secs: u32) -> Self {
        self.connection_timeout_secs = secs;
        self
    }

    pub fn with_max_frame_bytes(mut self, bytes: usize) -> Self {
        self.max_frame_bytes = bytes;
        self
    }

    pub fn with_send_queue_len(mut self, len: usize) -> Self {
        self.send_queue_len = len;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.max_connections == 0 {
            return Err(TransportError::InvalidConfig("max_connections cannot be 0".to_string()));
        }
        if self.max_frame_bytes == 0 {
            return Err(TransportError::InvalidConfig("max_frame_bytes cannot be 0".to_string()));
        }
        if self.send_queue_len == 0 {
            return Err(TransportError::InvalidConfig("send_queue_len cannot be 0".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// PEER ADDRESS
// ============================================================================

/// A peer's network address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    host: String,
    port: u16,
}

impl PeerAddress {
    /// Create a TCP address
    pub fn tcp(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    /// Parse `host:port`, optionally prefixed with `tcp://` or `ws://`
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        let trimmed = input.trim();
        let without_scheme = trimmed
            .strip_prefix("tcp://")
            .or_else(|| trimmed.strip_prefix("ws://"))
            .unwrap_or(trimmed)
            .trim_end_matches('/');

        let (host, port) = without_scheme
            .rsplit_once(':')
            .ok_or_else(|| TransportError::InvalidAddress(input.to_string()))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(TransportError::InvalidAddress(input.to_string()));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| TransportError::InvalidAddress(input.to_string()))?;

        Ok(Self::tcp(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` form, suitable for dialing
    pub fn host_port(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}", self.host_port())
    }
}

// ============================================================================
// CONNECTION ID
// ============================================================================

/// Unique identifier for a connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionId([u8; 16]);

impl ConnectionId {
    /// Generate a new unique connection ID
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 16];
        rng.fill(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl PartialEq for ConnectionId {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for ConnectionId {}

impl Hash for ConnectionId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

// ============================================================================
// CONNECTION INFO
// ============================================================================

/// Which side opened a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionDirection {
    /// The peer dialed us
    Inbound,
    /// We dialed the peer
    Outbound,
}

/// Information about an active connection
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    id: ConnectionId,
    address: PeerAddress,
    direction: ConnectionDirection,
    created_at: u64,
    frames_sent: u64,
    frames_received: u64,
    frames_dropped: u64,
}

impl ConnectionInfo {
    /// Create new connection info
    pub fn new(address: PeerAddress, direction: ConnectionDirection) -> Self {
        Self {
            id: ConnectionId::generate(),
            address,
            direction,
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            frames_sent: 0,
            frames_received: 0,
            frames_dropped: 0,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    pub fn direction(&self) -> ConnectionDirection {
        self.direction
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    pub fn record_sent(&mut self) {
        self.frames_sent = self.frames_sent.saturating_add(1);
    }

    pub fn record_received(&mut self) {
        self.frames_received = self.frames_received.saturating_add(1);
    }

    pub fn record_dropped(&mut self) {
        self.frames_dropped = self.frames_dropped.saturating_add(1);
    }
}

// ============================================================================
// TRANSPORT STATE
// ============================================================================

/// State of the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Running,
    Error(String),
}

impl TransportState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

// ============================================================================
// TRANSPORT EVENTS
// ============================================================================

/// Events emitted by the transport layer
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Transport started listening
    Listening { address: PeerAddress },

    /// New connection established, in either direction
    Connected {
        connection_id: ConnectionId,
        address: PeerAddress,
        direction: ConnectionDirection,
    },

    /// Connection closed or failed
    Disconnected {
        connection_id: ConnectionId,
        reason: String,
    },

    /// One text frame received
    FrameReceived {
        connection_id: ConnectionId,
        frame: String,
    },

    /// Non-fatal error, e.g. a failed dial or an oversized frame
    Error {
        connection_id: Option<ConnectionId>,
        error: TransportError,
    },
}

// ============================================================================
// TRANSPORT ERRORS
// ============================================================================

/// Errors that can occur in the transport layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Maximum connections reached")]
    MaxConnectionsReached,

    #[error("Not connected")]
    NotConnected,

    #[error("Transport not running")]
    NotRunning,

    #[error("Transport already running")]
    AlreadyRunning,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

// ============================================================================
// TRANSPORT STATISTICS
// ============================================================================

/// Statistics for transport operations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportStats {
    /// Number of active connections
    pub connections_active: u32,
    /// Total connections established
    pub connections_total: u64,
    /// Total frames handed to writers
    pub frames_sent: u64,
    /// Total frames received
    pub frames_received: u64,
    /// Frames dropped because a peer's send queue was full
    pub frames_dropped: u64,
    /// Errors encountered
    pub errors: u64,
}

// ============================================================================
// TRANSPORT TRAIT
// ============================================================================

/// Abstract transport for exchanging text frames with peers
///
/// Only `start` and `next_event` await. Everything else returns at once so
/// that a slow peer never stalls the caller's event loop.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Start listening
    async fn start(&mut self) -> Result<(), TransportError>;

    /// Stop listening and drop all connections
    fn stop(&mut self) -> Result<(), TransportError>;

    /// Dial a peer in the background; success arrives as `Connected`
    fn connect(&mut self, address: PeerAddress) -> Result<(), TransportError>;

    /// Close a connection
    fn disconnect(&mut self, connection_id: &ConnectionId) -> Result<(), TransportError>;

    /// Queue a frame for one peer
    fn send(&mut self, connection_id: &ConnectionId, frame: &str) -> Result<(), TransportError>;

    /// Queue a frame for every connected peer, returning how many accepted it
    fn broadcast(&mut self, frame: &str) -> u32;

    /// Wait for the next event; `None` once the transport is stopped
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Get the current transport state
    fn state(&self) -> &TransportState;

    /// Get the local address (if listening)
    fn local_address(&self) -> Option<PeerAddress>;

    /// Get connection count
    fn connection_count(&self) -> usize;

    /// Get information about a specific connection
    fn connection_info(&self, connection_id: &ConnectionId) -> Option<&ConnectionInfo>;

    /// Get transport statistics
    fn stats(&self) -> TransportStats;
}
