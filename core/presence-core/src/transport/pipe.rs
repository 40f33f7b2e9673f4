//! Windows named pipe transport.
//!
//! Pipes are opened with `FILE_FLAG_OVERLAPPED`. Every read and write is an
//! overlapped request bounded by `WaitForSingleObject`; a request that misses
//! its deadline is cancelled and waited out before its buffer is released.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::windows::fs::OpenOptionsExt;
use std::os::windows::io::AsRawHandle;
use std::thread;
use std::time::{Duration, Instant};

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, ERROR_IO_PENDING, HANDLE, WAIT_OBJECT_0};
use windows::Win32::Storage::FileSystem::{ReadFile, WriteFile, FILE_FLAG_OVERLAPPED};
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject};
use windows::Win32::System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED};

use super::{allocate_buffer, Connection, Endpoint, Transport};
use super::{ENDPOINT_PREFIX, MAX_ENDPOINTS};
use crate::error::TransportError;

const PIPE_ROOT: &str = r"\\.\pipe\";
const PIPE_BUSY_ATTEMPTS: u32 = 5;
const PIPE_BUSY_WAIT: Duration = Duration::from_millis(100);

const ERROR_BROKEN_PIPE: i32 = 109;
const ERROR_PIPE_BUSY: i32 = 231;
const ERROR_NO_DATA: i32 = 232;
const ERROR_PIPE_NOT_CONNECTED: i32 = 233;

#[derive(Debug, Clone, Copy, Default)]
pub struct PipeTransport;

impl PipeTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for PipeTransport {
    type Connection = PipeConnection;

    fn candidates(&self) -> Vec<Endpoint> {
        (0..MAX_ENDPOINTS)
            .map(|index| {
                Endpoint::new(index, format!("{}{}{}", PIPE_ROOT, ENDPOINT_PREFIX, index))
            })
            .collect()
    }

    fn open(&self, endpoint: &Endpoint) -> Result<PipeConnection, TransportError> {
        for attempt in 1..=PIPE_BUSY_ATTEMPTS {
            match OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags(FILE_FLAG_OVERLAPPED.0)
                .open(&endpoint.address)
            {
                Ok(file) => return Ok(PipeConnection { file: Some(file) }),
                Err(err) if err.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                    tracing::debug!(endpoint = %endpoint, attempt, "Pipe busy; waiting");
                    thread::sleep(PIPE_BUSY_WAIT);
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    return Err(TransportError::NotFound(endpoint.to_string()));
                }
                Err(err) => {
                    return Err(TransportError::Io {
                        context: format!("open {}", endpoint),
                        source: err,
                    })
                }
            }
        }
        Err(TransportError::NotFound(endpoint.to_string()))
    }
}

#[derive(Debug)]
pub struct PipeConnection {
    file: Option<File>,
}

impl PipeConnection {
    fn file(&mut self) -> Result<&File, TransportError> {
        self.file.as_ref().ok_or(TransportError::PeerClosed)
    }
}

fn pipe_error(err: io::Error, context: &str, timeout: Duration) -> TransportError {
    match err.raw_os_error() {
        Some(ERROR_BROKEN_PIPE | ERROR_NO_DATA | ERROR_PIPE_NOT_CONNECTED) => {
            TransportError::PeerClosed
        }
        _ => TransportError::from_io(err, context, timeout),
    }
}

/// Manual-reset event signalled when an overlapped request completes.
struct CompletionEvent(HANDLE);

impl CompletionEvent {
    fn new() -> Result<Self, TransportError> {
        // SAFETY: no security attributes or name; the handle is owned by the
        // returned guard.
        unsafe { CreateEventW(None, true, false, PCWSTR::null()) }
            .map(Self)
            .map_err(|err| TransportError::Io {
                context: "create completion event".to_string(),
                source: err.into(),
            })
    }
}

impl Drop for CompletionEvent {
    fn drop(&mut self) {
        // SAFETY: the handle came from CreateEventW and is closed exactly once.
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

enum Request<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

fn wait_millis(timeout: Duration) -> u32 {
    // u32::MAX is INFINITE.
    u32::try_from(timeout.as_millis()).map_or(u32::MAX - 1, |ms| ms.min(u32::MAX - 1))
}

/// Issues one overlapped read or write and waits at most `timeout` for it.
fn transfer(file: &File, request: Request<'_>, timeout: Duration) -> Result<usize, TransportError> {
    let handle = HANDLE(file.as_raw_handle());
    let event = CompletionEvent::new()?;
    let mut overlapped = OVERLAPPED {
        hEvent: event.0,
        ..Default::default()
    };
    let overlapped_ptr: *mut OVERLAPPED = &mut overlapped;

    let context = match request {
        Request::Read(_) => "read",
        Request::Write(_) => "write",
    };

    // SAFETY: `overlapped`, `event`, and the buffer all outlive the request;
    // every path below waits for completion or cancellation before returning.
    let issued = unsafe {
        match request {
            Request::Read(buffer) => ReadFile(handle, Some(buffer), None, Some(overlapped_ptr)),
            Request::Write(buffer) => WriteFile(handle, Some(buffer), None, Some(overlapped_ptr)),
        }
    };
    if let Err(err) = issued {
        if err.code() != ERROR_IO_PENDING.to_hresult() {
            return Err(pipe_error(err.into(), context, timeout));
        }
    }

    // SAFETY: `event` is a live event handle.
    let waited = unsafe { WaitForSingleObject(event.0, wait_millis(timeout)) };
    let mut transferred = 0u32;

    if waited != WAIT_OBJECT_0 {
        // SAFETY: cancels only this request, then blocks until the kernel is
        // done with `overlapped` and the buffer.
        unsafe {
            let _ = CancelIoEx(handle, Some(overlapped_ptr as *const OVERLAPPED));
            let _ = GetOverlappedResult(handle, overlapped_ptr, &mut transferred, true);
        }
        return Err(TransportError::Timeout(timeout));
    }

    // SAFETY: the request has completed; this only reads its result.
    unsafe { GetOverlappedResult(handle, overlapped_ptr, &mut transferred, false) }
        .map_err(|err| pipe_error(err.into(), context, timeout))?;
    Ok(transferred as usize)
}

impl Connection for PipeConnection {
    fn write_all(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), TransportError> {
        let file = self.file()?;
        let mut sent = 0;
        while sent < bytes.len() {
            match transfer(file, Request::Write(&bytes[sent..]), timeout)? {
                0 => return Err(TransportError::PeerClosed),
                n => sent += n,
            }
        }
        Ok(())
    }

    fn read_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let file = self.file()?;
        let mut buffer = allocate_buffer(len)?;
        let mut received = 0;
        let started = Instant::now();

        while received < len {
            match transfer(file, Request::Read(&mut buffer[received..]), timeout)? {
                0 if started.elapsed() >= timeout => return Err(TransportError::Timeout(timeout)),
                0 => continue,
                n => received += n,
            }
        }
        Ok(buffer)
    }

    fn close(&mut self) {
        self.file = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::core::HSTRING;
    use windows::Win32::Storage::FileSystem::PIPE_ACCESS_DUPLEX;
    use windows::Win32::System::Pipes::{CreateNamedPipeW, PIPE_TYPE_BYTE, PIPE_WAIT};

    /// Server end of a pipe that never reads or writes.
    struct SilentServer(HANDLE);

    /// Normalises the return of `CreateNamedPipeW` across binding revisions.
    trait IntoServerHandle {
        fn into_server_handle(self) -> HANDLE;
    }

    impl IntoServerHandle for HANDLE {
        fn into_server_handle(self) -> HANDLE {
            assert!(!self.is_invalid(), "CreateNamedPipeW failed");
            self
        }
    }

    impl IntoServerHandle for windows::core::Result<HANDLE> {
        fn into_server_handle(self) -> HANDLE {
            self.expect("CreateNamedPipeW failed")
        }
    }

    impl SilentServer {
        fn bind(name: &str) -> Self {
            let handle = unsafe {
                CreateNamedPipeW(
                    &HSTRING::from(name),
                    PIPE_ACCESS_DUPLEX | FILE_FLAG_OVERLAPPED,
                    PIPE_TYPE_BYTE | PIPE_WAIT,
                    1,
                    1,
                    1,
                    0,
                    None,
                )
            };
            Self(handle.into_server_handle())
        }
    }

    impl Drop for SilentServer {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }

    fn pipe_name(tag: &str) -> String {
        format!(r"\\.\pipe\presence-core-test-{}-{}", std::process::id(), tag)
    }

    #[test]
    fn candidates_are_ten_numbered_pipes() {
        let candidates = PipeTransport::new().candidates();
        assert_eq!(candidates.len(), 10);
        assert_eq!(
            candidates[0].address.to_string_lossy(),
            r"\\.\pipe\discord-ipc-0"
        );
        assert_eq!(candidates[9].index, 9);
    }

    #[test]
    fn broken_pipe_codes_map_to_peer_closed() {
        for code in [ERROR_BROKEN_PIPE, ERROR_NO_DATA, ERROR_PIPE_NOT_CONNECTED] {
            let err = pipe_error(
                io::Error::from_raw_os_error(code),
                "read",
                Duration::from_secs(1),
            );
            assert!(err.is_peer_closed());
        }
    }

    #[test]
    fn write_times_out_when_peer_stops_reading() {
        let name = pipe_name("write");
        let _server = SilentServer::bind(&name);
        let mut connection = PipeTransport::new()
            .open(&Endpoint::new(0, name.as_str()))
            .unwrap();

        let payload = vec![b'x'; 1 << 20];
        let started = Instant::now();
        let result = connection.write_all(&payload, Duration::from_millis(200));

        assert!(matches!(result, Err(TransportError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn read_times_out_when_peer_is_silent() {
        let name = pipe_name("read");
        let _server = SilentServer::bind(&name);
        let mut connection = PipeTransport::new()
            .open(&Endpoint::new(0, name.as_str()))
            .unwrap();

        let result = connection.read_exact(8, Duration::from_millis(100));
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }

    #[test]
    fn wait_millis_never_requests_infinite() {
        assert_eq!(wait_millis(Duration::from_millis(2000)), 2000);
        assert_eq!(wait_millis(Duration::MAX), u32::MAX - 1);
    }
}
