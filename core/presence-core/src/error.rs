//! Error types for presence-core operations.
//!
//! None of these are fatal to the host process. The worst outcome of any of
//! them is that presence is not shown until the next retry.

use presence_protocol::ProtocolError;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Transport Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Failures reported by a [`crate::Transport`] or [`crate::Connection`].
///
/// `PeerClosed` is kept apart from `Timeout` so the caller can tear the whole
/// connection down instead of merely retrying.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("endpoint not available: {0}")]
    NotFound(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, TransportError::PeerClosed)
    }

    /// Maps an OS error from a read or write into the transport taxonomy.
    pub fn from_io(err: io::Error, context: &str, timeout: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero => TransportError::PeerClosed,
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                TransportError::Timeout(timeout)
            }
            _ => TransportError::Io {
                context: context.to_string(),
                source: err,
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings file: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Settings file malformed: {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Session Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// No candidate endpoint accepted a handshake. The peer is not running or
    /// every slot is taken.
    #[error("Could not connect to Discord. Is Discord running?")]
    NotRunning,

    /// The caller withdrew a connect attempt before any candidate accepted.
    #[error("Connect attempt cancelled")]
    Cancelled,

    /// The connection handle was already invalidated.
    #[error("Pipe is invalid or disconnected.")]
    Disconnected,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The peer answered with an error response.
    #[error("Discord rejected the request: {0}")]
    Rejected(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to spawn presence worker: {0}")]
    WorkerSpawn(#[source] io::Error),

    #[error("Presence worker panicked")]
    WorkerPanicked,
}

impl PresenceError {
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, PresenceError::Transport(err) if err.is_peer_closed())
    }
}

/// Convenience type alias for Results using PresenceError.
pub type Result<T> = std::result::Result<T, PresenceError>;
