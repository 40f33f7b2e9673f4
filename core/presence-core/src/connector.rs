//! Endpoint discovery, handshake, and the synchronous request/response step.
//!
//! [`IpcConnector`] walks the transport's candidates in order and returns an
//! [`IpcLink`] for the first one that both opens and accepts the handshake.
//! The link owns the connection exclusively; once the transport reports a
//! peer-closed condition the handle is dropped and the link stays invalid.

use presence_protocol::{
    build_clear_activity, build_handshake, build_set_activity, classify_response, generate_nonce,
    Frame, FrameHeader, Opcode, Presence, ResponseKind, HEADER_LEN, UNRECOGNIZED_RESPONSE,
};
use std::time::Duration;

use crate::error::{PresenceError, Result, TransportError};
use crate::sink::Reporter;
use crate::transport::{Connection, Transport};

pub const WRITE_TIMEOUT: Duration = Duration::from_millis(2000);
pub const READ_TIMEOUT: Duration = Duration::from_millis(3000);

/// A live, handshaken channel that can carry activity updates.
pub trait Link: Send {
    fn set_activity(&mut self, presence: &Presence) -> Result<()>;

    fn clear_activity(&mut self) -> Result<()>;

    /// False once the peer has gone away or the link was closed.
    fn is_connected(&self) -> bool;

    fn close(&mut self);
}

/// Produces links. `NotRunning` is the expected failure when the peer is
/// absent.
pub trait Connector: Send + 'static {
    type Link: Link;

    /// Tries candidates while `keep_going` holds; once it returns false the
    /// attempt ends with `Cancelled` before the next candidate is opened.
    fn connect_while(
        &mut self,
        app_id: u64,
        keep_going: &dyn Fn() -> bool,
    ) -> Result<Self::Link>;

    fn connect(&mut self, app_id: u64) -> Result<Self::Link> {
        self.connect_while(app_id, &|| true)
    }
}

pub struct IpcConnector<T: Transport> {
    transport: T,
    reporter: Reporter,
}

impl<T: Transport> IpcConnector<T> {
    pub fn new(transport: T, reporter: Reporter) -> Self {
        Self {
            transport,
            reporter,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> Connector for IpcConnector<T> {
    type Link = IpcLink<T::Connection>;

    fn connect_while(
        &mut self,
        app_id: u64,
        keep_going: &dyn Fn() -> bool,
    ) -> Result<Self::Link> {
        let handshake = build_handshake(app_id)?;

        for endpoint in self.transport.candidates() {
            if !keep_going() {
                tracing::debug!(endpoint = %endpoint, "Connect cancelled");
                return Err(PresenceError::Cancelled);
            }
            let connection = match self.transport.open(&endpoint) {
                Ok(connection) => connection,
                Err(err) => {
                    tracing::trace!(endpoint = %endpoint, error = %err, "Endpoint unavailable");
                    continue;
                }
            };

            let mut link = IpcLink::new(connection, self.reporter.clone());
            match link.send_sync(&handshake) {
                Ok(_) => {
                    tracing::info!(endpoint = %endpoint, slot = endpoint.index, "Connected to Discord IPC");
                    return Ok(link);
                }
                Err(err) => {
                    tracing::debug!(endpoint = %endpoint, error = %err, "Handshake failed");
                    link.close();
                }
            }
        }

        self.reporter.report(&PresenceError::NotRunning.to_string());
        Err(PresenceError::NotRunning)
    }
}

/// Exclusive owner of one open connection.
pub struct IpcLink<C: Connection> {
    connection: Option<C>,
    pid: u64,
    reporter: Reporter,
}

impl<C: Connection> IpcLink<C> {
    pub fn new(connection: C, reporter: Reporter) -> Self {
        Self {
            connection: Some(connection),
            pid: u64::from(std::process::id()),
            reporter,
        }
    }

    /// Writes `frame`, reads back one response, and classifies it.
    ///
    /// A peer-closed condition from the transport invalidates the link before
    /// this returns, so the handle is never used again.
    pub fn send_sync(&mut self, frame: &Frame) -> Result<ResponseKind> {
        let result = self.exchange(frame);
        if let Err(err) = &result {
            if err.is_peer_closed() {
                tracing::info!("Discord closed the IPC connection");
                self.invalidate();
            }
        }
        result
    }

    fn exchange(&mut self, frame: &Frame) -> Result<ResponseKind> {
        let reporter = &self.reporter;
        let connection = match self.connection.as_mut() {
            Some(connection) => connection,
            None => {
                reporter.report(&PresenceError::Disconnected.to_string());
                return Err(PresenceError::Disconnected);
            }
        };
        let fail = |message: &str| {
            let message = message.to_string();
            move |err: TransportError| {
                reporter.report(&message);
                PresenceError::from(err)
            }
        };

        if let Some(nonce) = frame.nonce() {
            tracing::debug!(nonce, opcode = ?frame.opcode(), "Sending frame");
        }

        connection
            .write_all(&frame.header().encode(), WRITE_TIMEOUT)
            .map_err(fail("Failed to write header to Discord pipe."))?;
        connection
            .write_all(frame.body().as_bytes(), WRITE_TIMEOUT)
            .map_err(fail("Failed to write JSON payload to Discord pipe."))?;

        let raw_header = connection
            .read_exact(HEADER_LEN, READ_TIMEOUT)
            .map_err(fail(
                "Failed to read response header (Timeout or disconnected).",
            ))?;
        let mut header_bytes = [0u8; HEADER_LEN];
        header_bytes.copy_from_slice(&raw_header);
        let header = FrameHeader::decode(&header_bytes);

        let length = header.checked_length().map_err(|err| {
            reporter.report("Discord response is too large.");
            PresenceError::from(err)
        })?;
        let body = if length == 0 {
            Vec::new()
        } else {
            connection
                .read_exact(length, READ_TIMEOUT)
                .map_err(fail("Failed to read response body."))?
        };

        // The body is consumed first so the stream stays aligned on the next frame.
        let opcode = Opcode::try_from(header.opcode).map_err(|err| {
            tracing::debug!(opcode = header.opcode, length, "Unexpected response opcode");
            reporter.report(UNRECOGNIZED_RESPONSE);
            PresenceError::from(err)
        })?;
        if body.is_empty() {
            return Ok(ResponseKind::GenericOk);
        }
        let body = String::from_utf8_lossy(&body);

        if opcode == Opcode::Close {
            tracing::debug!(body = %body, "Discord sent a close frame");
        }

        match classify_response(&body) {
            ResponseKind::Error(message) => {
                reporter.report(&message);
                Err(PresenceError::Rejected(message))
            }
            kind => Ok(kind),
        }
    }

    fn invalidate(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
    }
}

impl<C: Connection> Link for IpcLink<C> {
    fn set_activity(&mut self, presence: &Presence) -> Result<()> {
        if self.connection.is_none() {
            return Err(PresenceError::Disconnected);
        }
        let frame = build_set_activity(self.pid, presence, &generate_nonce())?;
        self.send_sync(&frame).map(|_| ())
    }

    fn clear_activity(&mut self) -> Result<()> {
        if self.connection.is_none() {
            return Ok(());
        }
        let frame = build_clear_activity(self.pid, &generate_nonce())?;
        self.send_sync(&frame).map(|_| ())
    }

    fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn close(&mut self) {
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::test_utils::RecordingSink;
    use crate::transport::Endpoint;
    use presence_protocol::ProtocolError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted connection: records writes and replays queued reads.
    #[derive(Default)]
    struct ScriptedConnection {
        written: Arc<Mutex<Vec<u8>>>,
        reads: VecDeque<std::result::Result<Vec<u8>, TransportError>>,
        closed: Arc<Mutex<bool>>,
        fail_writes: Option<fn() -> TransportError>,
    }

    impl ScriptedConnection {
        fn replying(body: &str) -> Self {
            let mut connection = Self::default();
            connection.queue_response(1, body);
            connection
        }

        fn queue_response(&mut self, opcode: u32, body: &str) {
            let header = FrameHeader {
                opcode,
                length: body.len() as u32,
            };
            self.reads.push_back(Ok(header.encode().to_vec()));
            self.reads.push_back(Ok(body.as_bytes().to_vec()));
        }
    }

    impl Connection for ScriptedConnection {
        fn write_all(
            &mut self,
            bytes: &[u8],
            _timeout: Duration,
        ) -> std::result::Result<(), TransportError> {
            if let Some(fail) = self.fail_writes {
                return Err(fail());
            }
            self.written.lock().unwrap().extend_from_slice(bytes);
            Ok(())
        }

        fn read_exact(
            &mut self,
            len: usize,
            timeout: Duration,
        ) -> std::result::Result<Vec<u8>, TransportError> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    assert_eq!(bytes.len(), len, "read length mismatch");
                    Ok(bytes)
                }
                Some(Err(err)) => Err(err),
                None => Err(TransportError::Timeout(timeout)),
            }
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    /// Transport whose candidates map to pre-built connections.
    struct ScriptedTransport {
        slots: Mutex<Vec<Option<ScriptedConnection>>>,
        opened: Arc<Mutex<Vec<u8>>>,
    }

    impl ScriptedTransport {
        fn new(slots: Vec<Option<ScriptedConnection>>) -> Self {
            Self {
                slots: Mutex::new(slots),
                opened: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Transport for ScriptedTransport {
        type Connection = ScriptedConnection;

        fn candidates(&self) -> Vec<Endpoint> {
            let count = self.slots.lock().unwrap().len() as u8;
            (0..count)
                .map(|index| Endpoint::new(index, format!("slot-{index}")))
                .collect()
        }

        fn open(
            &self,
            endpoint: &Endpoint,
        ) -> std::result::Result<ScriptedConnection, TransportError> {
            self.opened.lock().unwrap().push(endpoint.index);
            self.slots.lock().unwrap()[endpoint.index as usize]
                .take()
                .ok_or_else(|| TransportError::NotFound(endpoint.to_string()))
        }
    }

    fn split_frame(bytes: &[u8]) -> (FrameHeader, String) {
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes[..HEADER_LEN]);
        let header = FrameHeader::decode(&header);
        let body = String::from_utf8(bytes[HEADER_LEN..].to_vec()).unwrap();
        (header, body)
    }

    const READY: &str = r#"{"cmd":"DISPATCH","evt":"READY","data":{"v":1}}"#;
    const ACK: &str = r#"{"cmd":"SET_ACTIVITY","data":{},"nonce":"123456"}"#;

    #[test]
    fn handshake_is_written_as_opcode_zero_frame() {
        let connection = ScriptedConnection::replying(READY);
        let written = Arc::clone(&connection.written);
        let mut link = IpcLink::new(connection, Reporter::silent());

        let kind = link.send_sync(&build_handshake(42_000_000_000_000_000).unwrap());
        assert_eq!(kind.unwrap(), ResponseKind::Ready);

        let (header, body) = split_frame(&written.lock().unwrap());
        assert_eq!(header.opcode, 0);
        assert_eq!(header.length as usize, body.len());
        assert_eq!(body, r#"{"v":1,"client_id":"42000000000000000"}"#);
    }

    #[test]
    fn oversized_response_is_rejected_without_reading_body() {
        let mut connection = ScriptedConnection::default();
        let header = FrameHeader {
            opcode: 1,
            length: 16385,
        };
        connection.reads.push_back(Ok(header.encode().to_vec()));
        let sink = Arc::new(RecordingSink::default());
        let mut link = IpcLink::new(connection, Reporter::new(sink.clone()));

        let result = link.set_activity(&Presence::default());
        assert!(matches!(result, Err(PresenceError::Protocol(_))));
        assert!(link.is_connected());
        assert_eq!(sink.messages(), vec!["Discord response is too large."]);
        assert_eq!(link.connection.as_ref().unwrap().reads.len(), 0);
    }

    #[test]
    fn error_response_reports_message_and_keeps_connection() {
        let connection =
            ScriptedConnection::replying(r#"{"code":4000,"message":"Invalid Client ID"}"#);
        let sink = Arc::new(RecordingSink::default());
        let mut link = IpcLink::new(connection, Reporter::new(sink.clone()));

        let result = link.set_activity(&Presence::default());
        assert!(matches!(result, Err(PresenceError::Rejected(ref m)) if m == "Invalid Client ID"));
        assert!(link.is_connected());
        assert_eq!(sink.messages(), vec!["Invalid Client ID"]);
    }

    #[test]
    fn peer_closed_invalidates_link_immediately() {
        let connection = ScriptedConnection {
            fail_writes: Some(|| TransportError::PeerClosed),
            ..ScriptedConnection::default()
        };
        let closed = Arc::clone(&connection.closed);
        let mut link = IpcLink::new(connection, Reporter::silent());

        let result = link.set_activity(&Presence::default());
        assert!(result.unwrap_err().is_peer_closed());
        assert!(!link.is_connected());
        assert!(*closed.lock().unwrap());

        assert!(matches!(
            link.set_activity(&Presence::default()),
            Err(PresenceError::Disconnected)
        ));
    }

    #[test]
    fn timeout_keeps_connection() {
        let connection = ScriptedConnection::default();
        let mut link = IpcLink::new(connection, Reporter::silent());
        let result = link.set_activity(&Presence::default());
        assert!(matches!(
            result,
            Err(PresenceError::Transport(TransportError::Timeout(_)))
        ));
        assert!(link.is_connected());
    }

    #[test]
    fn set_activity_sends_frame_and_accepts_ack() {
        let connection = ScriptedConnection::replying(ACK);
        let written = Arc::clone(&connection.written);
        let mut link = IpcLink::new(connection, Reporter::silent());

        let presence = Presence {
            details: "Title".into(),
            ..Presence::default()
        };
        link.set_activity(&presence).unwrap();

        let (header, body) = split_frame(&written.lock().unwrap());
        assert_eq!(header.opcode, 1);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["cmd"], "SET_ACTIVITY");
        assert_eq!(value["args"]["pid"], u64::from(std::process::id()));
        assert_eq!(value["args"]["activity"]["details"], "Title");
    }

    #[test]
    fn empty_response_body_counts_as_success() {
        let mut connection = ScriptedConnection::default();
        connection.reads.push_back(Ok(FrameHeader {
            opcode: 1,
            length: 0,
        }
        .encode()
        .to_vec()));
        let mut link = IpcLink::new(connection, Reporter::silent());
        assert!(link.set_activity(&Presence::default()).is_ok());
    }

    #[test]
    fn unknown_response_opcode_is_a_protocol_error() {
        let mut connection = ScriptedConnection::default();
        connection.queue_response(7, ACK);
        connection.queue_response(1, ACK);
        let sink = Arc::new(RecordingSink::default());
        let mut link = IpcLink::new(connection, Reporter::new(sink.clone()));

        let result = link.set_activity(&Presence::default());
        assert!(matches!(
            result,
            Err(PresenceError::Protocol(ProtocolError::UnknownOpcode(7)))
        ));
        assert!(link.is_connected());
        assert_eq!(sink.messages(), vec![UNRECOGNIZED_RESPONSE]);

        // The rejected frame's body was drained; the next response lines up.
        assert!(link.set_activity(&Presence::default()).is_ok());
    }

    #[test]
    fn clear_on_invalid_link_is_silent() {
        let connection = ScriptedConnection::default();
        let written = Arc::clone(&connection.written);
        let mut link = IpcLink::new(connection, Reporter::silent());
        link.close();
        assert!(link.clear_activity().is_ok());
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn connector_stops_at_first_slot_that_handshakes() {
        let mut rejecting = ScriptedConnection::default();
        rejecting.queue_response(1, r#"{"code":4000,"message":"nope"}"#);
        let rejecting_closed = Arc::clone(&rejecting.closed);

        let transport = ScriptedTransport::new(vec![
            None,
            Some(rejecting),
            Some(ScriptedConnection::replying(READY)),
            Some(ScriptedConnection::replying(READY)),
        ]);
        let opened = Arc::clone(&transport.opened);
        let mut connector = IpcConnector::new(transport, Reporter::silent());

        let link = connector.connect(1041018234058571847).unwrap();
        assert!(link.is_connected());
        assert_eq!(*opened.lock().unwrap(), vec![0, 1, 2]);
        assert!(*rejecting_closed.lock().unwrap());
    }

    #[test]
    fn connector_reports_not_running_when_all_slots_fail() {
        let transport = ScriptedTransport::new((0..10).map(|_| None).collect());
        let opened = Arc::clone(&transport.opened);
        let sink = Arc::new(RecordingSink::default());
        let mut connector = IpcConnector::new(transport, Reporter::new(sink.clone()));

        let result = connector.connect(1041018234058571847);
        assert!(matches!(result, Err(PresenceError::NotRunning)));
        assert_eq!(*opened.lock().unwrap(), (0..10).collect::<Vec<u8>>());
        assert_eq!(
            sink.messages(),
            vec!["Could not connect to Discord. Is Discord running?"]
        );
    }

    #[test]
    fn connector_stops_walking_candidates_once_cancelled() {
        let transport = ScriptedTransport::new((0..10).map(|_| None).collect());
        let opened = Arc::clone(&transport.opened);
        let sink = Arc::new(RecordingSink::default());
        let mut connector = IpcConnector::new(transport, Reporter::new(sink.clone()));

        let checks = std::cell::Cell::new(0);
        let result = connector.connect_while(1041018234058571847, &|| {
            checks.set(checks.get() + 1);
            checks.get() <= 1
        });

        assert!(matches!(result, Err(PresenceError::Cancelled)));
        assert_eq!(*opened.lock().unwrap(), vec![0]);
        assert!(sink.messages().is_empty());
    }
}
