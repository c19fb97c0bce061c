// Peer Management - Track connected peers
//
// The registry is the broadcast set: a peer is present from the moment its
// connection is established until the transport reports it closed.

use crate::transport::{ConnectionDirection, ConnectionId, PeerAddress};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Peer-related errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PeerError {
    #[error("Peer already registered")]
    AlreadyRegistered,

    #[error("Peer not found")]
    PeerNotFound,
}

/// Statistics about a peer registry
#[derive(Clone, Debug, Default)]
pub struct PeerStats {
    pub total_peers: usize,
    pub inbound_peers: usize,
    pub outbound_peers: usize,
    pub messages_received: u64,
    pub malformed_frames: u64,
}

/// Information about a connected peer
#[derive(Clone, Debug)]
pub struct PeerInfo {
    connection_id: ConnectionId,
    address: PeerAddress,
    direction: ConnectionDirection,
    /// Unix timestamp ms
    connected_at: u64,
    /// Unix timestamp ms
    last_seen: u64,
    messages_received: u64,
    malformed_frames: u64,
}

impl PeerInfo {
    /// Create a new peer info
    pub fn new(connection_id: ConnectionId, address: PeerAddress, direction: ConnectionDirection) -> Self {
        let now = now_millis();

        Self {
            connection_id,
            address,
            direction,
            connected_at: now,
            last_seen: now,
            messages_received: 0,
            malformed_frames: 0,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn address(&self) -> &PeerAddress {
        &self.address
    }

    pub fn direction(&self) -> ConnectionDirection {
        self.direction
    }

    pub fn connected_at(&self) -> u64 {
        self.connected_at
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames
    }

    /// Record a well-formed message from this peer
    pub fn record_message(&mut self) {
        self.messages_received = self.messages_received.saturating_add(1);
        self.last_seen = now_millis();
    }

    /// Record a frame from this peer that failed to decode
    pub fn record_malformed(&mut self) {
        self.malformed_frames = self.malformed_frames.saturating_add(1);
        self.last_seen = now_millis();
    }
}

/// Registry of connected peers
#[derive(Clone, Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<ConnectionId, PeerInfo>,
}

impl PeerRegistry {
    /// Create a new peer registry
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn has_peer(&self, connection_id: &ConnectionId) -> bool {
        self.peers.contains_key(connection_id)
    }

    /// Register a newly established connection
    pub fn add_peer(
        &mut self,
        connection_id: ConnectionId,
        address: PeerAddress,
        direction: ConnectionDirection,
    ) -> Result<(), PeerError> {
        if self.peers.contains_key(&connection_id) {
            return Err(PeerError::AlreadyRegistered);
        }

        self.peers.insert(
            connection_id.clone(),
            PeerInfo::new(connection_id, address, direction),
        );
        Ok(())
    }

    /// Remove a peer, returning its info
    pub fn remove_peer(&mut self, connection_id: &ConnectionId) -> Result<PeerInfo, PeerError> {
        self.peers.remove(connection_id).ok_or(PeerError::PeerNotFound)
    }

    pub fn get_peer(&self, connection_id: &ConnectionId) -> Option<&PeerInfo> {
        self.peers.get(connection_id)
    }

    pub fn get_peer_mut(&mut self, connection_id: &ConnectionId) -> Option<&mut PeerInfo> {
        self.peers.get_mut(connection_id)
    }

    pub fn all_peers(&self) -> Vec<&PeerInfo> {
        self.peers.values().collect()
    }

    /// `host:port` of every connected peer, sorted
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .peers
            .values()
            .map(|p| p.address.host_port())
            .collect();
        addresses.sort();
        addresses
    }

    /// Get statistics
    pub fn stats(&self) -> PeerStats {
        let mut stats = PeerStats {
            total_peers: self.peers.len(),
            ..PeerStats::default()
        };

        for peer in self.peers.values() {
            match peer.direction {
                ConnectionDirection::Inbound => stats.inbound_peers += 1,
                ConnectionDirection::Outbound => stats.outbound_peers += 1,
            }
            stats.messages_received += peer.messages_received;
            stats.malformed_frames += peer.malformed_frames;
        }

        stats
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
