// Transport module - THE WIRE (abstract)
// Provides an abstract transport layer and its TCP implementation

mod tcp;
mod traits;

pub use traits::{
    // Core trait
    Transport,
    // Configuration
    TransportConfig,
    // Connection types
    ConnectionDirection, ConnectionId, ConnectionInfo,
    // Address types
    PeerAddress,
    // Events and errors
    TransportError, TransportEvent, TransportState,
    // Statistics
    TransportStats,
};

pub use tcp::{TcpTransport, TcpTransportConfig};
