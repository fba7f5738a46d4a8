use gogodata_core::ResourceError;

/// Errors raised by the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The connection was closed before the send.
    #[error("sendRequest on closed CODAP connection: {0}")]
    Closed(String),
    /// No reply within the transport timeout.
    #[error("CODAP request timed out: {0}")]
    Timeout(String),
    /// The bootstrap pair got no reply.
    #[error("Connection request to CODAP timed out.")]
    InitTimeout,
    /// The host rejected the bootstrap pair.
    #[error("CODAP rejected the connection: {0}")]
    Rejected(String),
    #[error("malformed reply from CODAP: {0}")]
    MalformedReply(#[from] serde_json::Error),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Error returned by a subscriber handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
