use thiserror::Error;

/// Categorizes errors for handler decision-making.
///
/// A lightweight, cloneable view of [`Error`] that can be logged or matched
/// without holding on to the underlying transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Could not open the transport (DNS, TCP, TLS or handshake failure)
    TransportOpenFailure,
    /// The server closed the connection or the stream ended
    TransportClosed,
    /// WebSocket protocol or I/O error on an open connection
    TransportError,
    /// Inbound frame could not be decoded
    MalformedFrame,
    /// `send` was attempted while not connected
    SendWhileDisconnected,
    /// Automatic reconnection gave up
    ReconnectExhausted,
    /// Client lifecycle misuse or internal channel failure
    Other,
}

/// Errors that can occur in the weather stream client
#[derive(Error, Debug)]
pub enum Error {
    /// Transport could not be opened
    #[error("Failed to open connection: {0}")]
    TransportOpenFailure(String),

    /// Transport was closed by the peer
    #[error("Connection closed: {0}")]
    TransportClosed(String),

    /// WebSocket error on an open connection
    #[error("WebSocket error: {0}")]
    TransportError(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame was not valid JSON or did not match the expected shape
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Message dropped because the client is not connected
    #[error("Cannot send message - not connected")]
    SendWhileDisconnected,

    /// Gave up after the configured number of reconnection attempts
    #[error("Reconnection failed after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// `start` was called on a running client
    #[error("Client is already running")]
    AlreadyRunning,

    /// Operation requires a running client
    #[error("Client is not running")]
    NotRunning,

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),
}

impl Error {
    /// Get the kind of this error for decision-making.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TransportOpenFailure(_) => ErrorKind::TransportOpenFailure,
            Error::TransportClosed(_) => ErrorKind::TransportClosed,
            Error::TransportError(_) => ErrorKind::TransportError,
            Error::MalformedFrame(_) => ErrorKind::MalformedFrame,
            Error::SendWhileDisconnected => ErrorKind::SendWhileDisconnected,
            Error::ReconnectExhausted { .. } => ErrorKind::ReconnectExhausted,
            Error::AlreadyRunning | Error::NotRunning | Error::ChannelSend(_) => ErrorKind::Other,
        }
    }

    /// Whether the backoff state machine recovers from this error on its own.
    pub fn is_transport(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransportOpenFailure | ErrorKind::TransportClosed | ErrorKind::TransportError
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedFrame(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_recoverable() {
        assert!(Error::TransportOpenFailure("refused".into()).is_transport());
        assert!(Error::TransportClosed("eof".into()).is_transport());
        assert!(!Error::MalformedFrame("x".into()).is_transport());
        assert!(!Error::SendWhileDisconnected.is_transport());
        assert!(!Error::ReconnectExhausted { attempts: 5 }.is_transport());
    }

    #[test]
    fn test_json_error_maps_to_malformed_frame() {
        let err: Error = serde_json::from_str::<serde_json::Value>("not json")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::MalformedFrame);
    }
}
