//! Local transports to the chat client.
//!
//! A [`Transport`] knows the well-known candidate endpoints and how to open
//! one; the resulting [`Connection`] does blocking, timeout-bounded transfers.
//! Platform differences live only in the `socket` and `pipe` modules.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::TransportError;

#[cfg(windows)]
mod pipe;
#[cfg(unix)]
mod socket;

#[cfg(windows)]
pub use pipe::{PipeConnection, PipeTransport};
#[cfg(unix)]
pub use socket::{SocketConnection, SocketTransport};

/// Transport used on the current platform.
#[cfg(unix)]
pub type PlatformTransport = SocketTransport;
#[cfg(windows)]
pub type PlatformTransport = PipeTransport;

/// Number of numbered endpoint slots the chat client may listen on.
pub const MAX_ENDPOINTS: u8 = 10;

/// Shared prefix of every endpoint name; the slot index is appended.
pub const ENDPOINT_PREFIX: &str = "discord-ipc-";

/// One candidate address, tagged with its slot index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub index: u8,
    pub address: PathBuf,
}

impl Endpoint {
    pub fn new(index: u8, address: impl Into<PathBuf>) -> Self {
        Self {
            index,
            address: address.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address.display())
    }
}

/// An open channel to the peer.
///
/// Both transfers loop until every requested byte has moved. Each blocking
/// call gets the full `timeout`; partial progress is retried, never reported
/// as success. Dropping a connection closes it.
pub trait Connection: Send {
    fn write_all(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), TransportError>;

    fn read_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Closes the underlying handle. Further transfers fail with `PeerClosed`.
    fn close(&mut self);
}

/// Endpoint discovery and opening for one platform strategy.
pub trait Transport: Send + 'static {
    type Connection: Connection;

    /// Candidates in the order they should be tried.
    fn candidates(&self) -> Vec<Endpoint>;

    /// Opens `endpoint`, failing with `NotFound` when nobody is listening.
    fn open(&self, endpoint: &Endpoint) -> Result<Self::Connection, TransportError>;
}

/// Allocates a receive buffer without aborting on allocation failure.
pub(crate) fn allocate_buffer(len: usize) -> Result<Vec<u8>, TransportError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| TransportError::Io {
            context: format!("allocate {} byte receive buffer", len),
            source: std::io::ErrorKind::OutOfMemory.into(),
        })?;
    buffer.resize(len, 0);
    Ok(buffer)
}

/// Socket timeouts reject a zero duration.
pub(crate) fn effective_timeout(timeout: Duration) -> Duration {
    timeout.max(Duration::from_millis(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_display_is_its_address() {
        let endpoint = Endpoint::new(3, "/run/user/1000/discord-ipc-3");
        assert_eq!(endpoint.to_string(), "/run/user/1000/discord-ipc-3");
        assert_eq!(endpoint.index, 3);
    }

    #[test]
    fn allocate_buffer_is_zeroed_to_length() {
        let buffer = allocate_buffer(16).unwrap();
        assert_eq!(buffer, vec![0u8; 16]);
    }

    #[test]
    fn zero_timeout_is_clamped() {
        assert_eq!(effective_timeout(Duration::ZERO), Duration::from_millis(1));
        assert_eq!(
            effective_timeout(Duration::from_secs(2)),
            Duration::from_secs(2)
        );
    }
}
