// API module - THE CONTROL SURFACE
// HTTP routes that turn requests into node commands

mod http;

pub use http::{router, AddBlockRequest, AddPeerRequest};
