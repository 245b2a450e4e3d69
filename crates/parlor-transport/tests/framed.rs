//! Integration tests for the framed message channel.
//!
//! The framing tests run over an in-memory `tokio::io::duplex` pipe so
//! we can hand-craft malformed byte sequences. The TCP tests bind to
//! port 0 and connect through real loopback sockets.

use std::time::Duration;

use parlor_transport::{
    Connection, FrameConfig, FrameReader, FrameWriter, TcpConnection,
    TcpTransport, Transport, TransportError,
};
use tokio::io::AsyncWriteExt;

// =========================================================================
// FrameReader / FrameWriter
// =========================================================================

#[tokio::test]
async fn test_write_then_read_preserves_payload() {
    let (client, server) = tokio::io::duplex(1024);
    let mut writer = FrameWriter::new(client, FrameConfig::default());
    let mut reader = FrameReader::new(server, FrameConfig::default());

    writer.write_frame(br#"{"type":"Ping"}"#).await.unwrap();
    writer.write_frame("héllo".as_bytes()).await.unwrap();

    assert_eq!(
        reader.read_frame().await.unwrap().unwrap(),
        br#"{"type":"Ping"}"#
    );
    assert_eq!(
        reader.read_frame().await.unwrap().unwrap(),
        "héllo".as_bytes()
    );
}

#[tokio::test]
async fn test_header_is_big_endian_length() {
    let (client, mut server) = tokio::io::duplex(64);
    let mut writer = FrameWriter::new(client, FrameConfig::default());
    writer.write_frame(b"abc").await.unwrap();
    drop(writer);

    let mut raw = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut server, &mut raw)
        .await
        .unwrap();
    assert_eq!(raw, vec![0, 0, 0, 3, b'a', b'b', b'c']);
}

#[tokio::test]
async fn test_read_frame_clean_close_returns_none() {
    let (client, server) = tokio::io::duplex(64);
    drop(client);
    let mut reader = FrameReader::new(server, FrameConfig::default());
    assert!(reader.read_frame().await.unwrap().is_none());
}

#[tokio::test]
async fn test_read_frame_waits_for_full_body() {
    let (mut client, server) = tokio::io::duplex(64);
    let mut reader = FrameReader::new(server, FrameConfig::default());

    client.write_all(&[0, 0, 0, 6, b'h', b'e', b'l']).await.unwrap();

    let handle = tokio::spawn(async move { reader.read_frame().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished(), "must not deliver a partial frame");

    client.write_all(b"lo!").await.unwrap();
    let frame = handle.await.unwrap().unwrap().unwrap();
    assert_eq!(frame, b"hello!");
}

#[tokio::test]
async fn test_read_frame_oversized_header_rejected() {
    let (mut client, server) = tokio::io::duplex(64);
    let mut reader =
        FrameReader::new(server, FrameConfig { max_frame_len: 8 });

    client.write_all(&9u32.to_be_bytes()).await.unwrap();

    let err = reader.read_frame().await.unwrap_err();
    assert!(matches!(err, TransportError::FrameTooLarge { len: 9, max: 8 }));
    assert!(err.is_framing_violation());
}

#[tokio::test]
async fn test_read_frame_zero_length_rejected() {
    let (mut client, server) = tokio::io::duplex(64);
    let mut reader = FrameReader::new(server, FrameConfig::default());
    client.write_all(&[0, 0, 0, 0]).await.unwrap();

    assert!(matches!(
        reader.read_frame().await,
        Err(TransportError::EmptyFrame)
    ));
}

#[tokio::test]
async fn test_read_frame_eof_inside_body_is_truncated() {
    let (mut client, server) = tokio::io::duplex(64);
    let mut reader = FrameReader::new(server, FrameConfig::default());
    client.write_all(&[0, 0, 0, 10, b'x']).await.unwrap();
    drop(client);

    assert!(matches!(
        reader.read_frame().await,
        Err(TransportError::Truncated)
    ));
}

#[tokio::test]
async fn test_read_frame_eof_inside_header_is_truncated() {
    let (mut client, server) = tokio::io::duplex(64);
    let mut reader = FrameReader::new(server, FrameConfig::default());
    client.write_all(&[0, 0]).await.unwrap();
    drop(client);

    assert!(matches!(
        reader.read_frame().await,
        Err(TransportError::Truncated)
    ));
}

#[tokio::test]
async fn test_write_frame_refuses_oversized_payload() {
    let (client, _server) = tokio::io::duplex(64);
    let mut writer = FrameWriter::new(client, FrameConfig { max_frame_len: 4 });
    assert!(matches!(
        writer.write_frame(b"too long").await,
        Err(TransportError::FrameTooLarge { .. })
    ));
}

// =========================================================================
// TcpTransport
// =========================================================================

#[tokio::test]
async fn test_tcp_accept_and_exchange_frames() {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        transport.accept().await.expect("should accept")
    });
    let client = TcpConnection::connect(&addr, FrameConfig::default())
        .await
        .unwrap();
    let server_conn = server.await.unwrap();

    assert!(server_conn.id().into_inner() > 0);
    assert_ne!(server_conn.id(), client.id());

    server_conn.send(b"hello from server").await.unwrap();
    assert_eq!(client.recv().await.unwrap().unwrap(), b"hello from server");

    client.send(b"hello from client").await.unwrap();
    assert_eq!(
        server_conn.recv().await.unwrap().unwrap(),
        b"hello from client"
    );
}

#[tokio::test]
async fn test_tcp_recv_returns_none_on_peer_close() {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move { transport.accept().await.unwrap() });
    let client = TcpConnection::connect(&addr, FrameConfig::default())
        .await
        .unwrap();
    let server_conn = server.await.unwrap();

    client.close().await.unwrap();
    assert!(server_conn.recv().await.unwrap().is_none());
}

#[tokio::test]
async fn test_tcp_connect_to_closed_port_fails() {
    let transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap().to_string();
    drop(transport);

    let result = TcpConnection::connect(&addr, FrameConfig::default()).await;
    assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
}
