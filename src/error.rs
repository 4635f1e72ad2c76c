//! Error types for the control stream

use std::io;

use thiserror::Error;
use tokio_tungstenite::tungstenite::{self, error::ProtocolError};

#[derive(Error, Debug)]
pub enum StreamError {
    /// The peer closed the connection. Expected; ends a loop cleanly.
    #[error("peer disconnected")]
    PeerDisconnected,

    #[error("websocket transport error: {0}")]
    Transport(tungstenite::Error),

    #[error("failed to encode control frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("gave up after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl StreamError {
    /// Sort a transport failure into a peer close or a genuine error.
    pub fn from_transport(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                StreamError::PeerDisconnected
            }
            tungstenite::Error::Io(ref e) if is_peer_gone(e) => StreamError::PeerDisconnected,
            other => StreamError::Transport(other),
        }
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, StreamError::PeerDisconnected)
    }
}

impl From<tungstenite::Error> for StreamError {
    fn from(err: tungstenite::Error) -> Self {
        StreamError::from_transport(err)
    }
}

fn is_peer_gone(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_connection_is_a_disconnect() {
        assert!(StreamError::from_transport(tungstenite::Error::ConnectionClosed).is_disconnect());
        assert!(StreamError::from_transport(tungstenite::Error::AlreadyClosed).is_disconnect());
        let reset = tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake);
        assert!(StreamError::from_transport(reset).is_disconnect());
    }

    #[test]
    fn broken_pipe_is_a_disconnect() {
        let err = tungstenite::Error::Io(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(StreamError::from(err).is_disconnect());
    }

    #[test]
    fn other_failures_stay_transport_errors() {
        let err = tungstenite::Error::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(
            StreamError::from_transport(err),
            StreamError::Transport(_)
        ));
        let err = tungstenite::Error::Protocol(ProtocolError::UnmaskedFrameFromClient);
        assert!(!StreamError::from_transport(err).is_disconnect());
    }
}
