//! Session lifecycle and the worker loop.
//!
//! The worker moves through `Connecting -> Connected -> (Disconnected ->
//! Connecting | Idle)`. It owns the link exclusively; the caller only touches
//! the [`PresenceStore`] and the run flag.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::connector::{Connector, IpcConnector, Link};
use crate::error::{PresenceError, Result};
use crate::format::format_presence;
use crate::metadata::MetadataProvider;
use crate::settings::Settings;
use crate::sink::Reporter;
use crate::store::PresenceStore;
use crate::transport::PlatformTransport;

const RETRY_INTERVAL: Duration = Duration::from_secs(2);
const UPDATE_INTERVAL: Duration = Duration::from_secs(2);
const SLEEP_SLICE: Duration = Duration::from_millis(100);
const WORKER_NAME: &str = "presence-worker";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnected => "disconnected",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    retry_interval: Duration,
    update_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            retry_interval: RETRY_INTERVAL,
            update_interval: UPDATE_INTERVAL,
        }
    }
}

/// State shared between the session handle and its worker.
#[derive(Debug, Default)]
struct WorkerShared {
    running: AtomicBool,
    state: Mutex<SessionState>,
}

impl WorkerShared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn state(&self) -> SessionState {
        *self.state_guard()
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state_guard();
        let previous = *state;
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "Presence session state changed");
            *state = next;
        }
    }

    fn state_guard(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps up to `total`, waking early once the run flag clears.
    fn sleep_while_running(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
        false
    }
}

/// One presence session: settings, the shared store, and at most one worker.
pub struct Session<C: Connector = IpcConnector<PlatformTransport>> {
    settings: Settings,
    store: Arc<PresenceStore>,
    metadata: Box<dyn MetadataProvider>,
    connector: Arc<Mutex<C>>,
    shared: Arc<WorkerShared>,
    worker: Option<JoinHandle<()>>,
    timing: Timing,
}

impl Session {
    /// Session over the platform's default transport, reporting diagnostics
    /// through `tracing`.
    pub fn with_platform_transport(
        settings: Settings,
        metadata: Box<dyn MetadataProvider>,
    ) -> Self {
        let connector = IpcConnector::new(PlatformTransport::default(), Reporter::tracing());
        Session::new(settings, connector, metadata)
    }
}

impl<C: Connector> Session<C> {
    pub fn new(settings: Settings, connector: C, metadata: Box<dyn MetadataProvider>) -> Self {
        Self {
            settings,
            store: Arc::new(PresenceStore::new()),
            metadata,
            connector: Arc::new(Mutex::new(connector)),
            shared: Arc::new(WorkerShared::default()),
            worker: None,
            timing: Timing::default(),
        }
    }

    #[cfg(test)]
    fn with_timing(mut self, retry_interval: Duration, update_interval: Duration) -> Self {
        self.timing = Timing {
            retry_interval,
            update_interval,
        };
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<PresenceStore> {
        &self.store
    }

    /// Last state published by the worker.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Spawns the worker. A no-op while disabled or already running.
    pub fn start(&mut self) -> Result<()> {
        if !self.settings.enabled {
            tracing::debug!("Presence disabled; not starting worker");
            return Ok(());
        }
        if self.worker.is_some() {
            return Ok(());
        }

        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.set_state(SessionState::Connecting);

        let connector = Arc::clone(&self.connector);
        let store = Arc::clone(&self.store);
        let shared = Arc::clone(&self.shared);
        let app_id = self.settings.app_id;
        let timing = self.timing;

        let spawned = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || {
                let mut connector = connector.lock().unwrap_or_else(PoisonError::into_inner);
                run_worker(&mut *connector, app_id, &store, &shared, timing);
            });

        match spawned {
            Ok(handle) => {
                tracing::info!(app_id, "Presence worker started");
                self.worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::SeqCst);
                self.shared.set_state(SessionState::Idle);
                Err(PresenceError::WorkerSpawn(err))
            }
        }
    }

    /// Refreshes the store from the metadata provider. Never touches the
    /// transport; a no-op while disabled.
    pub fn request_update(&self) {
        if !self.settings.enabled {
            return;
        }
        let metadata = self.metadata.current_metadata();
        self.store
            .replace(format_presence(metadata.as_ref(), &self.settings));
    }

    /// Clears the run flag and waits for the worker, including its final
    /// clear-activity send, to exit.
    pub fn stop(&mut self) -> Result<()> {
        self.shared.running.store(false, Ordering::SeqCst);
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        let joined = worker.join();
        self.shared.set_state(SessionState::Idle);
        match joined {
            Ok(()) => {
                tracing::info!("Presence worker stopped");
                Ok(())
            }
            Err(_) => Err(PresenceError::WorkerPanicked),
        }
    }

    /// Toggles reporting at runtime. Settings and store survive a disable.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.settings.enabled = enabled;
        if enabled {
            self.start()
        } else {
            self.stop()
        }
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(error = %err, "Presence worker did not shut down cleanly");
        }
    }
}

impl<C: Connector> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .field("running", &self.worker.is_some())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Worker Loop
// ═══════════════════════════════════════════════════════════════════════════════

fn run_worker<C: Connector>(
    connector: &mut C,
    app_id: u64,
    store: &PresenceStore,
    shared: &WorkerShared,
    timing: Timing,
) {
    while shared.is_running() {
        shared.set_state(SessionState::Connecting);
        let Some(mut link) = connect_with_retry(connector, app_id, shared, timing) else {
            break;
        };

        shared.set_state(SessionState::Connected);
        store.mark_started(chrono::Utc::now().timestamp());
        push_updates(&mut link, store, shared, timing);

        if shared.is_running() {
            shared.set_state(SessionState::Disconnected);
            link.close();
            continue;
        }

        if link.is_connected() {
            if let Err(err) = link.clear_activity() {
                tracing::debug!(error = %err, "Failed to clear activity on shutdown");
            }
        }
        link.close();
    }
    shared.set_state(SessionState::Idle);
}

fn connect_with_retry<C: Connector>(
    connector: &mut C,
    app_id: u64,
    shared: &WorkerShared,
    timing: Timing,
) -> Option<C::Link> {
    let mut attempt: u32 = 0;
    while shared.is_running() {
        attempt += 1;
        match connector.connect_while(app_id, &|| shared.is_running()) {
            Ok(link) => return Some(link),
            Err(PresenceError::Cancelled) => break,
            Err(err) => {
                tracing::debug!(attempt, error = %err, "Connect attempt failed; retrying");
            }
        }
        if !shared.sleep_while_running(timing.retry_interval) {
            break;
        }
    }
    None
}

/// Sends the current snapshot every tick until the link drops or the run flag
/// clears.
fn push_updates<L: Link>(link: &mut L, store: &PresenceStore, shared: &WorkerShared, timing: Timing) {
    while shared.is_running() {
        let presence = store.snapshot();
        match link.set_activity(&presence) {
            Ok(()) => {}
            Err(err) if err.is_peer_closed() => {
                tracing::info!("Lost connection to Discord; reconnecting");
                return;
            }
            Err(err) => tracing::debug!(error = %err, "Presence update failed"),
        }
        if !link.is_connected() {
            return;
        }
        if !shared.sleep_while_running(timing.update_interval) {
            return;
        }
    }
}
