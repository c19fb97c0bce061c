// TCP Transport Tests
// Tests for listening, dialing and exchanging newline-delimited frames

use chainmesh::transport::{
    ConnectionDirection, ConnectionId, PeerAddress, TcpTransport, TcpTransportConfig, Transport,
    TransportConfig, TransportError, TransportEvent, TransportState,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

fn local_config() -> TcpTransportConfig {
    TcpTransportConfig::new().with_bind_address("127.0.0.1").with_bind_port(0)
}

async fn started() -> (TcpTransport, PeerAddress) {
    let mut transport = TcpTransport::new(local_config());
    transport.start().await.unwrap();
    let address = transport.local_address().unwrap();
    match next(&mut transport).await {
        TransportEvent::Listening { address: listening } => assert_eq!(listening, address),
        other => panic!("expected Listening, got {:?}", other),
    }
    (transport, address)
}

async fn next(transport: &mut TcpTransport) -> TransportEvent {
    timeout(Duration::from_secs(5), transport.next_event())
        .await
        .expect("timed out waiting for transport event")
        .expect("transport closed")
}

async fn expect_connected(transport: &mut TcpTransport) -> (ConnectionId, ConnectionDirection) {
    match next(transport).await {
        TransportEvent::Connected { connection_id, direction, .. } => (connection_id, direction),
        other => panic!("expected Connected, got {:?}", other),
    }
}

async fn expect_frame(transport: &mut TcpTransport) -> (ConnectionId, String) {
    match next(transport).await {
        TransportEvent::FrameReceived { connection_id, frame } => (connection_id, frame),
        other => panic!("expected FrameReceived, got {:?}", other),
    }
}

/// Two started transports with `a` dialed into `b`
async fn connected_pair() -> (TcpTransport, ConnectionId, TcpTransport, ConnectionId) {
    let (mut a, _) = started().await;
    let (mut b, b_addr) = started().await;

    a.connect(b_addr).unwrap();
    let (a_conn, a_dir) = expect_connected(&mut a).await;
    let (b_conn, b_dir) = expect_connected(&mut b).await;
    assert_eq!(a_dir, ConnectionDirection::Outbound);
    assert_eq!(b_dir, ConnectionDirection::Inbound);

    (a, a_conn, b, b_conn)
}

// ============================================================================
// CONFIG
// ============================================================================

#[test]
fn test_config_builders() {
    let config = TcpTransportConfig::new()
        .with_bind_address("127.0.0.1")
        .with_bind_port(7001)
        .with_nodelay(false)
        .with_base_config(TransportConfig::new().with_max_connections(5).with_send_queue_len(8));

    assert_eq!(config.bind_address, "127.0.0.1");
    assert_eq!(config.bind_port, 7001);
    assert!(!config.nodelay);
    assert_eq!(config.base.max_connections, 5);
    assert_eq!(config.base.send_queue_len, 8);
}

#[test]
fn test_invalid_base_config() {
    assert!(TransportConfig::new().with_max_connections(0).validate().is_err());
    assert!(TransportConfig::new().with_send_queue_len(0).validate().is_err());
    assert!(TransportConfig::default().validate().is_ok());
}

// ============================================================================
// ADDRESSES
// ============================================================================

#[test]
fn test_peer_address_parse() {
    let plain = PeerAddress::parse("127.0.0.1:7001").unwrap();
    assert_eq!(plain.host(), "127.0.0.1");
    assert_eq!(plain.port(), 7001);

    assert_eq!(PeerAddress::parse("tcp://localhost:7002").unwrap().host_port(), "localhost:7002");
    assert_eq!(PeerAddress::parse("ws://10.0.0.5:6001").unwrap().port(), 6001);
}

#[test]
fn test_peer_address_parse_rejects_garbage() {
    assert!(matches!(PeerAddress::parse("nohost"), Err(TransportError::InvalidAddress(_))));
    assert!(matches!(PeerAddress::parse("host:notaport"), Err(TransportError::InvalidAddress(_))));
    assert!(matches!(PeerAddress::parse(":7001"), Err(TransportError::InvalidAddress(_))));
}

#[test]
fn test_connection_ids_are_unique() {
    assert_ne!(ConnectionId::generate(), ConnectionId::generate());
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_start_and_stop() {
    let (mut transport, address) = started().await;

    assert!(transport.state().is_running());
    assert_eq!(address.host(), "127.0.0.1");
    assert_ne!(address.port(), 0);

    transport.stop().unwrap();
    assert_eq!(transport.state(), &TransportState::Stopped);
    assert!(transport.local_address().is_none());
}

#[tokio::test]
async fn test_double_start_fails() {
    let (mut transport, _) = started().await;

    assert_eq!(transport.start().await, Err(TransportError::AlreadyRunning));
}

#[tokio::test]
async fn test_operations_before_start_fail() {
    let mut transport = TcpTransport::new(local_config());

    assert_eq!(
        transport.connect(PeerAddress::tcp("127.0.0.1", 1)),
        Err(TransportError::NotRunning)
    );
    assert_eq!(transport.stop(), Err(TransportError::NotRunning));
    assert!(transport.next_event().await.is_none());
}

// ============================================================================
// CONNECTIONS AND FRAMES
// ============================================================================

#[tokio::test]
async fn test_connect_and_exchange_frames() {
    let (mut a, a_conn, mut b, b_conn) = connected_pair().await;

    a.send(&a_conn, r#"{"type":0}"#).unwrap();
    let (from, frame) = expect_frame(&mut b).await;
    assert_eq!(from, b_conn);
    assert_eq!(frame, r#"{"type":0}"#);

    b.send(&b_conn, r#"{"type":1}"#).unwrap();
    let (_, frame) = expect_frame(&mut a).await;
    assert_eq!(frame, r#"{"type":1}"#);

    assert_eq!(a.connection_info(&a_conn).unwrap().frames_sent(), 1);
    assert_eq!(b.connection_info(&b_conn).unwrap().frames_received(), 1);
    assert_eq!(a.stats().frames_sent, 1);
}

#[tokio::test]
async fn test_frames_arrive_in_order() {
    let (mut a, a_conn, mut b, _) = connected_pair().await;

    for i in 0..10 {
        a.send(&a_conn, &format!("frame {}", i)).unwrap();
    }
    for i in 0..10 {
        let (_, frame) = expect_frame(&mut b).await;
        assert_eq!(frame, format!("frame {}", i));
    }
}

#[tokio::test]
async fn test_broadcast_reaches_every_connection() {
    let (mut hub, hub_addr) = started().await;
    let (mut left, _) = started().await;
    let (mut right, _) = started().await;

    left.connect(hub_addr.clone()).unwrap();
    expect_connected(&mut left).await;
    expect_connected(&mut hub).await;
    right.connect(hub_addr).unwrap();
    expect_connected(&mut right).await;
    expect_connected(&mut hub).await;

    assert_eq!(hub.broadcast("hello"), 2);
    assert_eq!(expect_frame(&mut left).await.1, "hello");
    assert_eq!(expect_frame(&mut right).await.1, "hello");
}

#[tokio::test]
async fn test_send_to_unknown_connection_fails() {
    let (mut transport, _) = started().await;

    assert_eq!(
        transport.send(&ConnectionId::generate(), "x"),
        Err(TransportError::NotConnected)
    );
}

#[tokio::test]
async fn test_remote_close_is_reported() {
    let (mut a, a_conn, mut b, b_conn) = connected_pair().await;

    a.disconnect(&a_conn).unwrap();
    match next(&mut a).await {
        TransportEvent::Disconnected { connection_id, .. } => assert_eq!(connection_id, a_conn),
        other => panic!("expected Disconnected, got {:?}", other),
    }

    match next(&mut b).await {
        TransportEvent::Disconnected { connection_id, .. } => assert_eq!(connection_id, b_conn),
        other => panic!("expected Disconnected, got {:?}", other),
    }
    assert_eq!(b.connection_count(), 0);
}

#[tokio::test]
async fn test_dial_failure_is_an_event() {
    let (mut a, _) = started().await;
    // Reserve a port, then release it so nothing is listening there
    let closed_port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    a.connect(PeerAddress::tcp("127.0.0.1", closed_port)).unwrap();

    assert!(matches!(
        next(&mut a).await,
        TransportEvent::Error { connection_id: None, .. }
    ));
    assert_eq!(a.connection_count(), 0);
}

#[tokio::test]
async fn test_raw_socket_frames_and_blank_lines() {
    let (mut transport, address) = started().await;
    let mut stream = TcpStream::connect(address.host_port()).await.unwrap();
    let (conn, _) = expect_connected(&mut transport).await;

    stream.write_all(b"\n\r\nfirst\r\nsecond\n").await.unwrap();

    assert_eq!(expect_frame(&mut transport).await.1, "first");
    assert_eq!(expect_frame(&mut transport).await.1, "second");

    transport.send(&conn, "reply").unwrap();
    let mut line = String::new();
    BufReader::new(&mut stream).read_line(&mut line).await.unwrap();
    assert_eq!(line, "reply\n");
}

#[tokio::test]
async fn test_oversized_frame_is_an_error_not_a_disconnect() {
    let config = local_config().with_base_config(TransportConfig::new().with_max_frame_bytes(16));
    let mut transport = TcpTransport::new(config);
    transport.start().await.unwrap();
    next(&mut transport).await;
    let address = transport.local_address().unwrap();

    let mut stream = TcpStream::connect(address.host_port()).await.unwrap();
    let (conn, _) = expect_connected(&mut transport).await;

    stream.write_all(b"this line is far too long to accept\nok\n").await.unwrap();

    match next(&mut transport).await {
        TransportEvent::Error { connection_id, error } => {
            assert_eq!(connection_id, Some(conn.clone()));
            assert!(matches!(error, TransportError::FrameTooLarge(_)));
        }
        other => panic!("expected Error, got {:?}", other),
    }
    assert_eq!(expect_frame(&mut transport).await, (conn, "ok".to_string()));
}

#[tokio::test]
async fn test_unterminated_oversized_stream_is_reported_early() {
    let config = local_config().with_base_config(TransportConfig::new().with_max_frame_bytes(16));
    let mut transport = TcpTransport::new(config);
    transport.start().await.unwrap();
    next(&mut transport).await;
    let address = transport.local_address().unwrap();

    let mut stream = TcpStream::connect(address.host_port()).await.unwrap();
    let (conn, _) = expect_connected(&mut transport).await;

    // No newline yet: the limit alone must trigger the error
    stream.write_all(&vec![b'x'; 64 * 1024]).await.unwrap();
    match next(&mut transport).await {
        TransportEvent::Error { connection_id, error } => {
            assert_eq!(connection_id, Some(conn.clone()));
            assert!(matches!(error, TransportError::FrameTooLarge(n) if n > 16));
        }
        other => panic!("expected Error, got {:?}", other),
    }

    // The rest of the long line is skipped, and the connection keeps working
    stream.write_all(&vec![b'y'; 4096]).await.unwrap();
    stream.write_all(b"\nok\n").await.unwrap();
    assert_eq!(expect_frame(&mut transport).await, (conn.clone(), "ok".to_string()));

    transport.send(&conn, "still here").unwrap();
    let mut line = String::new();
    BufReader::new(&mut stream).read_line(&mut line).await.unwrap();
    assert_eq!(line, "still here\n");
}

#[tokio::test]
async fn test_frame_at_limit_with_crlf_is_accepted() {
    let config = local_config().with_base_config(TransportConfig::new().with_max_frame_bytes(4));
    let mut transport = TcpTransport::new(config);
    transport.start().await.unwrap();
    next(&mut transport).await;
    let address = transport.local_address().unwrap();

    let mut stream = TcpStream::connect(address.host_port()).await.unwrap();
    expect_connected(&mut transport).await;

    stream.write_all(b"abcd\r\n").await.unwrap();
    assert_eq!(expect_frame(&mut transport).await.1, "abcd");
}
