// Node Runtime - The single event loop
//
// Every event source (peer frames, connection changes, control-surface
// commands) is funnelled through channels into one loop that owns the
// gossip engine. Chain mutations therefore never interleave and need no
// locks. Nothing in the loop blocks on a peer: sends are queued, dials run
// in the background.

use crate::chain::Block;
use crate::config::NodeConfig;
use crate::sync::{GossipEngine, GossipError, GossipEvent, Message, PeerRegistry};
use crate::transport::{
    ConnectionId, PeerAddress, TcpTransport, Transport, TransportError, TransportEvent,
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Node-level errors
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Gossip error: {0}")]
    Gossip(#[from] GossipError),

    #[error("Node is not running")]
    Stopped,
}

/// Requests from the control surface into the event loop
#[derive(Debug)]
pub enum NodeCommand {
    /// Snapshot of the full chain
    Blocks { reply: oneshot::Sender<Vec<Block>> },
    /// Create, append and broadcast a block carrying `data`
    MineBlock {
        data: Value,
        reply: oneshot::Sender<Result<Block, NodeError>>,
    },
    /// `host:port` of every connected peer
    Peers { reply: oneshot::Sender<Vec<String>> },
    /// Dial a new peer
    AddPeer {
        address: PeerAddress,
        reply: oneshot::Sender<Result<(), NodeError>>,
    },
}

/// Cloneable handle for talking to a running node
#[derive(Clone, Debug)]
pub struct NodeHandle {
    commands: mpsc::Sender<NodeCommand>,
}

impl NodeHandle {
    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> NodeCommand,
    ) -> Result<R, NodeError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| NodeError::Stopped)?;
        response.await.map_err(|_| NodeError::Stopped)
    }

    /// Get a copy of the full chain
    pub async fn blocks(&self) -> Result<Vec<Block>, NodeError> {
        self.request(|reply| NodeCommand::Blocks { reply }).await
    }

    /// Create a block from `data`, append it and broadcast the new tip
    pub async fn mine_block(&self, data: Value) -> Result<Block, NodeError> {
        self.request(|reply| NodeCommand::MineBlock { data, reply })
            .await?
    }

    /// List connected peers
    pub async fn peers(&self) -> Result<Vec<String>, NodeError> {
        self.request(|reply| NodeCommand::Peers { reply }).await
    }

    /// Start dialing a peer; the connection completes in the background
    pub async fn add_peer(&self, address: PeerAddress) -> Result<(), NodeError> {
        self.request(|reply| NodeCommand::AddPeer { address, reply })
            .await?
    }
}

/// A ledger node: gossip engine, broadcast set and transport
pub struct Node<T: Transport> {
    engine: GossipEngine,
    peers: PeerRegistry,
    transport: T,
    commands: mpsc::Receiver<NodeCommand>,
    initial_peers: Vec<PeerAddress>,
}

impl Node<TcpTransport> {
    /// Build a TCP node from configuration
    pub fn from_config(config: &NodeConfig) -> (Self, NodeHandle) {
        let transport = TcpTransport::new(config.p2p.clone());
        Self::new(
            transport,
            config.initial_peers.clone(),
            config.command_queue_len,
        )
    }
}

impl<T: Transport> Node<T> {
    /// Create a node over any transport
    pub fn new(
        transport: T,
        initial_peers: Vec<PeerAddress>,
        command_queue_len: usize,
    ) -> (Self, NodeHandle) {
        let (tx, rx) = mpsc::channel(command_queue_len.max(1));
        let node = Self {
            engine: GossipEngine::default(),
            peers: PeerRegistry::new(),
            transport,
            commands: rx,
            initial_peers,
        };
        (node, NodeHandle { commands: tx })
    }

    pub fn engine(&self) -> &GossipEngine {
        &self.engine
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Start listening and dial the initial peers
    ///
    /// Returns the address the transport is listening on.
    pub async fn start(&mut self) -> Result<PeerAddress, NodeError> {
        self.transport.start().await?;

        for peer in std::mem::take(&mut self.initial_peers) {
            if let Err(e) = self.transport.connect(peer.clone()) {
                warn!(peer = %peer, error = %e, "unable to dial initial peer");
            }
        }

        self.transport
            .local_address()
            .ok_or(NodeError::Transport(TransportError::NotRunning))
    }

    /// Run the event loop until every `NodeHandle` is dropped
    pub async fn run(mut self) -> Result<(), NodeError> {
        if !self.transport.state().is_running() {
            self.start().await?;
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                event = self.transport.next_event() => match event {
                    Some(event) => self.handle_transport_event(event),
                    None => break,
                },
            }
        }

        info!("node event loop stopped");
        if self.transport.state().is_running() {
            self.transport.stop()?;
        }
        Ok(())
    }

    fn handle_command(&mut self, command: NodeCommand) {
        match command {
            NodeCommand::Blocks { reply } => {
                let _ = reply.send(self.engine.ledger().blocks().to_vec());
            }
            NodeCommand::MineBlock { data, reply } => {
                let result = match self.engine.submit_block_data(data) {
                    Ok(block) => {
                        info!(index = block.index(), hash = block.hash(), "new block was added");
                        let tip = self.engine.latest_block_message();
                        self.broadcast_message(&tip);
                        Ok(block)
                    }
                    Err(e) => {
                        warn!(error = %e, "locally produced block rejected");
                        Err(e.into())
                    }
                };
                let _ = reply.send(result);
            }
            NodeCommand::Peers { reply } => {
                let _ = reply.send(self.peers.addresses());
            }
            NodeCommand::AddPeer { address, reply } => {
                info!(peer = %address, "dialing peer");
                let _ = reply.send(self.transport.connect(address).map_err(Into::into));
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Listening { address } => {
                info!(address = %address, "p2p listener ready");
            }
            TransportEvent::Connected {
                connection_id,
                address,
                direction,
            } => {
                info!(connection = %connection_id, peer = %address, ?direction, "peer connected");
                if let Err(e) = self.peers.add_peer(connection_id.clone(), address, direction) {
                    warn!(connection = %connection_id, error = %e, "peer registry out of sync");
                }
                let query = self.engine.on_peer_connected();
                self.send_message(&connection_id, &query);
            }
            TransportEvent::Disconnected {
                connection_id,
                reason,
            } => {
                if let Ok(peer) = self.peers.remove_peer(&connection_id) {
                    info!(connection = %connection_id, peer = %peer.address(), %reason, "peer disconnected");
                }
            }
            TransportEvent::FrameReceived {
                connection_id,
                frame,
            } => self.handle_frame(connection_id, &frame),
            TransportEvent::Error {
                connection_id,
                error,
            } => match connection_id {
                Some(id) => warn!(connection = %id, error = %error, "transport error"),
                None => warn!(error = %error, "transport error"),
            },
        }
    }

    fn handle_frame(&mut self, connection_id: ConnectionId, frame: &str) {
        debug!(connection = %connection_id, frame, "received frame");

        match self.engine.process_frame(frame) {
            Ok(events) => {
                if let Some(peer) = self.peers.get_peer_mut(&connection_id) {
                    peer.record_message();
                }
                for event in events {
                    self.dispatch(&connection_id, event);
                }
            }
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "dropping malformed frame");
                if let Some(peer) = self.peers.get_peer_mut(&connection_id) {
                    peer.record_malformed();
                }
            }
        }
    }

    fn dispatch(&mut self, origin: &ConnectionId, event: GossipEvent) {
        match event {
            GossipEvent::Reply(msg) => self.send_message(origin, &msg),
            GossipEvent::Broadcast(msg) => {
                let sent = self.broadcast_message(&msg);
                debug!(message_type = ?msg.message_type(), peers = sent, "broadcast");
            }
            GossipEvent::BlockAppended(block) => {
                info!(index = block.index(), "appended block received from peer");
            }
            GossipEvent::ChainReplaced {
                previous_length,
                new_length,
            } => {
                info!(previous_length, new_length, "replaced chain with peer's chain");
            }
        }
    }

    fn send_message(&mut self, connection_id: &ConnectionId, message: &Message) {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "failed to encode message");
                return;
            }
        };
        if let Err(e) = self.transport.send(connection_id, &frame) {
            debug!(connection = %connection_id, error = %e, "send failed");
        }
    }

    fn broadcast_message(&mut self, message: &Message) -> u32 {
        match message.encode() {
            Ok(frame) => self.transport.broadcast(&frame),
            Err(e) => {
                warn!(message_type = ?message.message_type(), error = %e, "failed to encode message");
                0
            }
        }
    }
}
