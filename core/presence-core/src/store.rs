//! Mutex-guarded presence shared between the caller and the worker.
//!
//! The lock is held only for the copy in or out, never across I/O.

use presence_protocol::Presence;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct PresenceStore {
    inner: Mutex<Presence>,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock-consistent copy of the current presence.
    pub fn snapshot(&self) -> Presence {
        self.lock().clone()
    }

    /// Replaces the whole presence in one locked step.
    pub fn replace(&self, presence: Presence) {
        *self.lock() = presence;
    }

    /// Sets the activity start time, leaving every other field alone.
    pub fn mark_started(&self, epoch_secs: i64) {
        self.lock().start = epoch_secs;
    }

    // Plain data: a poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, Presence> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
