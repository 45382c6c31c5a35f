use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::utils::Diagnostics;

struct LockEntry {
    mutex: Arc<Mutex<()>>,
    /// Holders plus waiters. The entry leaves the map when this hits zero.
    waiters: AtomicUsize,
    /// Probe for callers that bypassed the lock.
    in_flight: AtomicBool,
}

impl LockEntry {
    fn new() -> Self {
        Self {
            mutex: Arc::new(Mutex::new(())),
            waiters: AtomicUsize::new(0),
            in_flight: AtomicBool::new(false),
        }
    }
}

struct LockInner {
    entries: DashMap<String, Arc<LockEntry>>,
    diagnostics: Diagnostics,
    acquired_total: AtomicU64,
    contended_total: AtomicU64,
}

/// Lock statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LockStats {
    pub active_sessions: usize,
    pub acquired_total: u64,
    pub contended_total: u64,
}

/// Per-session mutual exclusion.
///
/// All mutating work for one session runs under its guard, so two requests
/// on the same session execute in arrival order while distinct sessions
/// proceed in parallel. Entries are created on first use and torn down once
/// nobody holds or awaits them, so an idle server keeps no lock state.
pub struct SessionLock {
    inner: Arc<LockInner>,
}

/// RAII guard for one session. Dropping it releases the session, including
/// on panic or future cancellation.
pub struct SessionGuard {
    inner: Arc<LockInner>,
    entry: Arc<LockEntry>,
    session_id: String,
    permit: Option<OwnedMutexGuard<()>>,
}

impl SessionLock {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            inner: Arc::new(LockInner {
                entries: DashMap::new(),
                diagnostics,
                acquired_total: AtomicU64::new(0),
                contended_total: AtomicU64::new(0),
            }),
        }
    }

    /// Wait for exclusive access to a session.
    pub async fn acquire(&self, session_id: &str) -> SessionGuard {
        // Register as a waiter while the map shard is still locked, so the
        // entry cannot be torn down between lookup and registration.
        let entry = {
            let slot = self
                .inner
                .entries
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(LockEntry::new()));
            slot.value().waiters.fetch_add(1, Ordering::SeqCst);
            slot.value().clone()
        };

        if entry.in_flight.load(Ordering::SeqCst) {
            self.inner.contended_total.fetch_add(1, Ordering::Relaxed);
            debug!(session_id = session_id, "waiting on busy session");
        }

        // Cleanup runs through the guard's Drop from here on, even if this
        // future is cancelled mid-await.
        let mut guard = SessionGuard {
            inner: self.inner.clone(),
            entry: entry.clone(),
            session_id: session_id.to_string(),
            permit: None,
        };

        let permit = entry.mutex.clone().lock_owned().await;
        guard.permit = Some(permit);
        self.inner.acquired_total.fetch_add(1, Ordering::Relaxed);

        if entry.in_flight.swap(true, Ordering::SeqCst) {
            self.inner.diagnostics.invariant_violation(
                "session_lock",
                &format!("double in-flight for session {session_id}"),
            );
        }

        guard
    }

    /// Run a future while holding the session exclusively.
    pub async fn with_lock<T, F>(&self, session_id: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.acquire(session_id).await;
        fut.await
    }

    pub fn stats(&self) -> LockStats {
        LockStats {
            active_sessions: self.inner.entries.len(),
            acquired_total: self.inner.acquired_total.load(Ordering::Relaxed),
            contended_total: self.inner.contended_total.load(Ordering::Relaxed),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.permit.is_some() {
            self.entry.in_flight.store(false, Ordering::SeqCst);
            // Releases the mutex for the next waiter.
            self.permit = None;
        }
        let before = self.entry.waiters.fetch_sub(1, Ordering::SeqCst);
        if before == 1 {
            self.inner
                .entries
                .remove_if(&self.session_id, |_, e| e.waiters.load(Ordering::SeqCst) == 0);
        }
    }
}
