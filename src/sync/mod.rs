// Sync module - HOW NODES TALK
// Handles the gossip protocol, message dispatch and the broadcast set

mod gossip;
mod peer;
mod protocol;

pub use gossip::{GossipEngine, GossipError, GossipEvent, GossipStats};
pub use peer::{PeerError, PeerInfo, PeerRegistry, PeerStats};
pub use protocol::{Message, MessageType, ProtocolError};
