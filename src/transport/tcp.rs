// TCP Transport Implementation
// Newline-delimited text frames over TCP, one reader and one writer task per connection

use crate::transport::{
    ConnectionDirection, ConnectionId, ConnectionInfo, PeerAddress, Transport, TransportConfig,
    TransportError, TransportEvent, TransportState, TransportStats,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

// ============================================================================
// TCP TRANSPORT CONFIG
// ============================================================================

/// Configuration for TCP transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpTransportConfig {
    /// Base transport configuration
    pub base: TransportConfig,
    /// Address to bind to
    pub bind_address: String,
    /// Port to bind to (0 for random)
    pub bind_port: u16,
    /// Enable TCP_NODELAY
    pub nodelay: bool,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            base: TransportConfig::default(),
            bind_address: "0.0.0.0".to_string(),
            bind_port: 0,
            nodelay: true,
        }
    }
}

impl TcpTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_config(mut self, base: TransportConfig) -> Self {
        self.base = base;
        self
    }

    pub fn with_bind_address(mut self, addr: &str) -> Self {
        self.bind_address = addr.to_string();
        self
    }

    pub fn with_bind_port(mut self, port: u16) -> Self {
        self.bind_port = port;
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

// ============================================================================
// INTERNAL CONNECTION STATE
// ============================================================================

struct TcpConnection {
    info: ConnectionInfo,
    writer: mpsc::Sender<String>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl TcpConnection {
    fn abort(&self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

/// A stream that finished its handshake and is waiting to be registered
struct PendingConnection {
    stream: TcpStream,
    address: PeerAddress,
    direction: ConnectionDirection,
}

enum Next {
    Pending(PendingConnection),
    Event(TransportEvent),
    Closed,
}

/// Forward newline-delimited frames from one connection until it closes.
///
/// At most `max_frame_bytes` (plus a trailing '\r') are buffered per line.
/// A longer line is reported as soon as it crosses the limit, then skipped
/// through its '\n'; the connection stays open.
async fn read_frames<R: AsyncBufRead + Unpin>(
    mut reader: R,
    connection_id: ConnectionId,
    max_frame_bytes: usize,
    event_tx: mpsc::Sender<TransportEvent>,
) {
    let mut buf = Vec::new();
    let mut discarding = false;

    loop {
        let (line_done, used) = match reader.fill_buf().await {
            Ok([]) => {
                let _ = event_tx
                    .send(TransportEvent::Disconnected {
                        connection_id,
                        reason: "Connection closed".to_string(),
                    })
                    .await;
                return;
            }
            Ok(chunk) => {
                let (line_done, content, used) = match chunk.iter().position(|&b| b == b'\n') {
                    Some(i) => (true, &chunk[..i], i + 1),
                    None => (false, chunk, chunk.len()),
                };
                if !discarding {
                    buf.extend_from_slice(content);
                }
                (line_done, used)
            }
            Err(e) => {
                let _ = event_tx
                    .send(TransportEvent::Disconnected {
                        connection_id,
                        reason: e.to_string(),
                    })
                    .await;
                return;
            }
        };
        reader.consume(used);

        let mut event = None;
        if !discarding && buf.len() > max_frame_bytes.saturating_add(1) {
            event = Some(TransportEvent::Error {
                connection_id: Some(connection_id.clone()),
                error: TransportError::FrameTooLarge(buf.len()),
            });
            discarding = true;
            buf.clear();
        }

        if line_done {
            if discarding {
                discarding = false;
            } else {
                while buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                if buf.len() > max_frame_bytes {
                    event = Some(TransportEvent::Error {
                        connection_id: Some(connection_id.clone()),
                        error: TransportError::FrameTooLarge(buf.len()),
                    });
                } else if !buf.is_empty() {
                    // Invalid UTF-8 is passed on lossily and rejected by the decoder
                    event = Some(TransportEvent::FrameReceived {
                        connection_id: connection_id.clone(),
                        frame: String::from_utf8_lossy(&buf).into_owned(),
                    });
                }
                buf.clear();
            }
        }

        if let Some(event) = event {
            if event_tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

// ============================================================================
// TCP TRANSPORT
// ============================================================================

/// TCP transport implementation
pub struct TcpTransport {
    config: TcpTransportConfig,
    state: TransportState,
    local_address: Option<PeerAddress>,
    connections: HashMap<ConnectionId, TcpConnection>,
    queued: VecDeque<TransportEvent>,
    stats: TransportStats,
    listener_task: Option<JoinHandle<()>>,
    pending_tx: Option<mpsc::Sender<PendingConnection>>,
    pending_rx: Option<mpsc::Receiver<PendingConnection>>,
    event_tx: Option<mpsc::Sender<TransportEvent>>,
    event_rx: Option<mpsc::Receiver<TransportEvent>>,
}

impl TcpTransport {
    pub fn new(config: TcpTransportConfig) -> Self {
        Self {
            config,
            state: TransportState::Stopped,
            local_address: None,
            connections: HashMap::new(),
            queued: VecDeque::new(),
            stats: TransportStats::default(),
            listener_task: None,
            pending_tx: None,
            pending_rx: None,
            event_tx: None,
            event_rx: None,
        }
    }

    fn setup_connection(&mut self, pending: PendingConnection) -> Result<ConnectionId, TransportError> {
        if self.connections.len() >= self.config.base.max_connections as usize {
            return Err(TransportError::MaxConnectionsReached);
        }
        let event_tx = self.event_tx.clone().ok_or(TransportError::NotRunning)?;

        pending.stream.set_nodelay(self.config.nodelay).ok();

        let info = ConnectionInfo::new(pending.address, pending.direction);
        let conn_id = info.id().clone();

        let (write_tx, mut write_rx) = mpsc::channel::<String>(self.config.base.send_queue_len);
        let (read_half, mut write_half) = pending.stream.into_split();
        let max_frame_bytes = self.config.base.max_frame_bytes;

        // Reader task: split on '\n', forward each frame to the event loop
        let reader_task = tokio::spawn(read_frames(
            BufReader::new(read_half),
            conn_id.clone(),
            max_frame_bytes,
            event_tx,
        ));

        // Writer task: one frame per line
        let writer_task = tokio::spawn(async move {
            while let Some(frame) = write_rx.recv().await {
                let mut bytes = frame.into_bytes();
                bytes.push(b'\n');
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        });

        self.connections.insert(
            conn_id.clone(),
            TcpConnection {
                info,
                writer: write_tx,
                reader_task,
                writer_task,
            },
        );
        self.stats.connections_active = self.connections.len() as u32;
        self.stats.connections_total += 1;

        Ok(conn_id)
    }

    fn remove_connection(&mut self, connection_id: &ConnectionId) -> bool {
        match self.connections.remove(connection_id) {
            Some(conn) => {
                conn.abort();
                self.stats.connections_active = self.connections.len() as u32;
                true
            }
            None => false,
        }
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.listener_task.take() {
            handle.abort();
        }
        for (_, conn) in self.connections.drain() {
            conn.abort();
        }
        self.stats.connections_active = 0;
        self.queued.clear();
        self.pending_tx = None;
        self.pending_rx = None;
        self.event_tx = None;
        self.event_rx = None;
        self.local_address = None;
        self.state = TransportState::Stopped;
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Transport for TcpTransport {
    async fn start(&mut self) -> Result<(), TransportError> {
        if self.state.is_running() {
            return Err(TransportError::AlreadyRunning);
        }
        self.config.base.validate()?;

        let bind_addr = format!("{}:{}", self.config.bind_address, self.config.bind_port);
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            self.state = TransportState::Error(e.to_string());
            TransportError::ConnectionFailed(e.to_string())
        })?;
        let local_addr = listener.local_addr()?;
        let local_address = PeerAddress::tcp(&local_addr.ip().to_string(), local_addr.port());

        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(1000);
        let (pending_tx, pending_rx) = mpsc::channel::<PendingConnection>(100);

        let accept_tx = pending_tx.clone();
        let accept_events = event_tx.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let pending = PendingConnection {
                            stream,
                            address: PeerAddress::tcp(&addr.ip().to_string(), addr.port()),
                            direction: ConnectionDirection::Inbound,
                        };
                        if accept_tx.send(pending).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        let _ = accept_events
                            .send(TransportEvent::Error {
                                connection_id: None,
                                error: e.into(),
                            })
                            .await;
                        sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        });

        self.queued.push_back(TransportEvent::Listening {
            address: local_address.clone(),
        });
        self.local_address = Some(local_address);
        self.event_tx = Some(event_tx);
        self.event_rx = Some(event_rx);
        self.pending_tx = Some(pending_tx);
        self.pending_rx = Some(pending_rx);
        self.listener_task = Some(handle);
        self.state = TransportState::Running;

        Ok(())
    }

    fn stop(&mut self) -> Result<(), TransportError> {
        if !self.state.is_running() {
            return Err(TransportError::NotRunning);
        }
        self.shutdown();
        Ok(())
    }

    fn connect(&mut self, address: PeerAddress) -> Result<(), TransportError> {
        if !self.state.is_running() {
            return Err(TransportError::NotRunning);
        }
        if self.connections.len() >= self.config.base.max_connections as usize {
            return Err(TransportError::MaxConnectionsReached);
        }

        let (Some(pending_tx), Some(event_tx)) = (self.pending_tx.clone(), self.event_tx.clone())
        else {
            return Err(TransportError::NotRunning);
        };
        let connect_timeout = Duration::from_secs(self.config.base.connection_timeout_secs as u64);

        tokio::spawn(async move {
            let target = address.host_port();
            let error = match timeout(connect_timeout, TcpStream::connect(&target)).await {
                Ok(Ok(stream)) => {
                    let _ = pending_tx
                        .send(PendingConnection {
                            stream,
                            address,
                            direction: ConnectionDirection::Outbound,
                        })
                        .await;
                    return;
                }
                Ok(Err(e)) => TransportError::ConnectionFailed(format!("{}: {}", target, e)),
                Err(_) => TransportError::Timeout,
            };
            debug!(peer = %target, error = %error, "dial failed");
            let _ = event_tx
                .send(TransportEvent::Error {
                    connection_id: None,
                    error,
                })
                .await;
        });

        Ok(())
    }

    fn disconnect(&mut self, connection_id: &ConnectionId) -> Result<(), TransportError> {
        if !self.remove_connection(connection_id) {
            return Err(TransportError::NotConnected);
        }

        self.queued.push_back(TransportEvent::Disconnected {
            connection_id: connection_id.clone(),
            reason: "Disconnected by local".to_string(),
        });

        Ok(())
    }

    fn send(&mut self, connection_id: &ConnectionId, frame: &str) -> Result<(), TransportError> {
        let connection = self
            .connections
            .get_mut(connection_id)
            .ok_or(TransportError::NotConnected)?;

        match connection.writer.try_send(frame.to_string()) {
            Ok(()) => {
                connection.info.record_sent();
                self.stats.frames_sent += 1;
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                connection.info.record_dropped();
                self.stats.frames_dropped += 1;
                Err(TransportError::SendFailed("send queue full".to_string()))
            }
            Err(TrySendError::Closed(_)) => {
                Err(TransportError::SendFailed("connection closed".to_string()))
            }
        }
    }

    fn broadcast(&mut self, frame: &str) -> u32 {
        let conn_ids: Vec<ConnectionId> = self.connections.keys().cloned().collect();

        let mut count = 0u32;
        for conn_id in conn_ids {
            match self.send(&conn_id, frame) {
                Ok(()) => count += 1,
                Err(e) => debug!(connection = %conn_id, error = %e, "broadcast skipped peer"),
            }
        }
        count
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Some(event);
            }

            let next = {
                let (Some(pending_rx), Some(event_rx)) =
                    (self.pending_rx.as_mut(), self.event_rx.as_mut())
                else {
                    return None;
                };

                tokio::select! {
                    Some(pending) = pending_rx.recv() => Next::Pending(pending),
                    Some(event) = event_rx.recv() => Next::Event(event),
                    else => Next::Closed,
                }
            };

            match next {
                Next::Pending(pending) => {
                    let address = pending.address.clone();
                    let direction = pending.direction;
                    return Some(match self.setup_connection(pending) {
                        Ok(connection_id) => TransportEvent::Connected {
                            connection_id,
                            address,
                            direction,
                        },
                        Err(error) => {
                            self.stats.errors += 1;
                            TransportEvent::Error {
                                connection_id: None,
                                error,
                            }
                        }
                    });
                }
                Next::Event(event) => {
                    match &event {
                        TransportEvent::Disconnected { connection_id, .. } => {
                            // Already gone if we disconnected it ourselves
                            if !self.remove_connection(connection_id) {
                                continue;
                            }
                        }
                        TransportEvent::FrameReceived { connection_id, .. } => {
                            match self.connections.get_mut(connection_id) {
                                Some(conn) => conn.info.record_received(),
                                None => continue,
                            }
                            self.stats.frames_received += 1;
                        }
                        TransportEvent::Error { .. } => self.stats.errors += 1,
                        _ => {}
                    }
                    return Some(event);
                }
                Next::Closed => return None,
            }
        }
    }

    fn state(&self) -> &TransportState {
        &self.state
    }

    fn local_address(&self) -> Option<PeerAddress> {
        self.local_address.clone()
    }

    fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn connection_info(&self, connection_id: &ConnectionId) -> Option<&ConnectionInfo> {
        self.connections.get(connection_id).map(|c| &c.info)
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
