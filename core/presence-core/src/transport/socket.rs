//! Unix domain socket transport.
//!
//! Endpoints live in `$XDG_RUNTIME_DIR` (or `/tmp` when unset). When the
//! runtime dir is not `/tmp`, each slot is also tried under `/tmp`, right after
//! the primary path for the same slot.
//!
//! Writes go through plain `write(2)`, not `send(2)` with `MSG_NOSIGNAL`. A
//! write to a socket whose peer has gone raises SIGPIPE; Rust binaries start
//! with it ignored, so the write fails with `EPIPE` and surfaces as
//! [`TransportError::PeerClosed`].

use std::env;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{allocate_buffer, effective_timeout, Connection, Endpoint, Transport};
use super::{ENDPOINT_PREFIX, MAX_ENDPOINTS};
use crate::error::TransportError;

const RUNTIME_DIR_ENV: &str = "XDG_RUNTIME_DIR";
const FALLBACK_DIR: &str = "/tmp";

/// Discord IPC over Unix domain sockets.
///
/// A host that is not a Rust binary (a C plugin loading this library, for
/// instance) must set SIGPIPE to `SIG_IGN` before the first write. Otherwise
/// the peer closing mid-write terminates the host process.
#[derive(Debug, Clone)]
pub struct SocketTransport {
    primary: PathBuf,
    fallback: Option<PathBuf>,
}

impl SocketTransport {
    /// Resolves directories from the environment.
    pub fn new() -> Self {
        let primary = env::var_os(RUNTIME_DIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(FALLBACK_DIR));
        Self::with_dirs(primary, Some(PathBuf::from(FALLBACK_DIR)))
    }

    /// Uses explicit directories. A fallback equal to the primary is ignored.
    pub fn with_dirs(primary: impl Into<PathBuf>, fallback: Option<PathBuf>) -> Self {
        let primary = primary.into();
        let fallback = fallback.filter(|dir| dir != &primary);
        Self { primary, fallback }
    }

    pub fn primary_dir(&self) -> &Path {
        &self.primary
    }

    pub fn fallback_dir(&self) -> Option<&Path> {
        self.fallback.as_deref()
    }
}

impl Default for SocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SocketTransport {
    type Connection = SocketConnection;

    fn candidates(&self) -> Vec<Endpoint> {
        let mut candidates = Vec::with_capacity(MAX_ENDPOINTS as usize * 2);
        for index in 0..MAX_ENDPOINTS {
            let name = format!("{}{}", ENDPOINT_PREFIX, index);
            candidates.push(Endpoint::new(index, self.primary.join(&name)));
            if let Some(fallback) = &self.fallback {
                candidates.push(Endpoint::new(index, fallback.join(&name)));
            }
        }
        candidates
    }

    fn open(&self, endpoint: &Endpoint) -> Result<SocketConnection, TransportError> {
        match UnixStream::connect(&endpoint.address) {
            Ok(stream) => Ok(SocketConnection {
                stream: Some(stream),
            }),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
                ) =>
            {
                Err(TransportError::NotFound(endpoint.to_string()))
            }
            Err(err) => Err(TransportError::Io {
                context: format!("connect {}", endpoint),
                source: err,
            }),
        }
    }
}

#[derive(Debug)]
pub struct SocketConnection {
    stream: Option<UnixStream>,
}

impl SocketConnection {
    /// Wraps an already connected stream.
    pub fn from_stream(stream: UnixStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    fn stream(&mut self) -> Result<&mut UnixStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::PeerClosed)
    }
}

impl Connection for SocketConnection {
    fn write_all(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), TransportError> {
        let timeout = effective_timeout(timeout);
        let stream = self.stream()?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(|err| TransportError::from_io(err, "set write timeout", timeout))?;

        let mut sent = 0;
        while sent < bytes.len() {
            match stream.write(&bytes[sent..]) {
                Ok(0) => return Err(TransportError::PeerClosed),
                Ok(n) => sent += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::from_io(err, "write", timeout)),
            }
        }
        Ok(())
    }

    fn read_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let timeout = effective_timeout(timeout);
        let stream = self.stream()?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|err| TransportError::from_io(err, "set read timeout", timeout))?;

        let mut buffer = allocate_buffer(len)?;
        let mut received = 0;
        while received < len {
            match stream.read(&mut buffer[received..]) {
                Ok(0) => return Err(TransportError::PeerClosed),
                Ok(n) => received += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::from_io(err, "read", timeout)),
            }
        }
        Ok(buffer)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

impl Drop for SocketConnection {
    fn drop(&mut self) {
        self.close();
    }
}
