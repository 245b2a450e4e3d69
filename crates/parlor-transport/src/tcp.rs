//! Framed TCP transport.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::{
    Connection, ConnectionId, FrameConfig, FrameReader, FrameWriter,
    Transport, TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A TCP [`Transport`] whose connections exchange length-prefixed frames.
pub struct TcpTransport {
    listener: TcpListener,
    config: FrameConfig,
}

impl TcpTransport {
    /// Binds a new transport to the given address with default limits.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        Self::bind_with(addr, FrameConfig::default()).await
    }

    /// Binds a new transport with explicit framing limits.
    pub async fn bind_with(
        addr: &str,
        config: FrameConfig,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "framed TCP transport listening");
        Ok(Self { listener, config })
    }

    /// Returns the address the listener is bound to.
    ///
    /// Binding to port 0 lets the OS pick a port; this is how callers
    /// learn which one it chose.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        let conn = TcpConnection::from_stream(stream, addr, self.config);
        tracing::debug!(id = %conn.id, %addr, "accepted framed connection");
        Ok(conn)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A single framed TCP connection.
///
/// Reads and writes are guarded separately so one task can block in
/// `recv` while another sends.
pub struct TcpConnection {
    id: ConnectionId,
    peer: SocketAddr,
    reader: Mutex<FrameReader<OwnedReadHalf>>,
    writer: Mutex<FrameWriter<OwnedWriteHalf>>,
}

impl TcpConnection {
    /// Opens an outbound framed connection.
    pub async fn connect(
        addr: &str,
        config: FrameConfig,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await.map_err(|source| {
            TransportError::ConnectFailed {
                addr: addr.to_string(),
                source,
            }
        })?;
        let peer = stream.peer_addr().map_err(|source| {
            TransportError::ConnectFailed {
                addr: addr.to_string(),
                source,
            }
        })?;
        let conn = Self::from_stream(stream, peer, config);
        tracing::debug!(id = %conn.id, %peer, "opened framed connection");
        Ok(conn)
    }

    fn from_stream(
        stream: TcpStream,
        peer: SocketAddr,
        config: FrameConfig,
    ) -> Self {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        Self {
            id: ConnectionId::new(
                NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            ),
            peer,
            reader: Mutex::new(FrameReader::new(read_half, config)),
            writer: Mutex::new(FrameWriter::new(write_half, config)),
        }
    }

    /// Returns the remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        self.writer.lock().await.write_frame(data).await
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        self.reader.lock().await.read_frame().await
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.writer.lock().await.shutdown().await
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
