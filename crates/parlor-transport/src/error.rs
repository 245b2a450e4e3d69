/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Opening an outbound connection failed.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A frame header declared a length above the configured maximum.
    ///
    /// The body is never read; the connection must be dropped because
    /// the stream is no longer aligned on a frame boundary.
    #[error("frame of {len} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    /// A frame header declared a zero-length body.
    #[error("empty frame")]
    EmptyFrame,

    /// The stream ended in the middle of a frame.
    #[error("stream ended inside a frame")]
    Truncated,

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Returns `true` if the peer violated the framing rules, as opposed
    /// to an I/O failure on our side.
    pub fn is_framing_violation(&self) -> bool {
        matches!(
            self,
            Self::FrameTooLarge { .. } | Self::EmptyFrame | Self::Truncated
        )
    }
}
