//! Live session accounting

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counts accepted and currently live sessions
///
/// Each session holds a [`SessionGuard`]; the live count drops when the
/// session object itself is destroyed, not merely when its socket closes.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    active: AtomicU64,
    accepted: AtomicU64,
}

impl ConnectionTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new session and return its guard
    pub fn open(self: &Arc<Self>) -> SessionGuard {
        let id = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        self.active.fetch_add(1, Ordering::SeqCst);
        SessionGuard {
            id,
            tracker: Arc::clone(self),
        }
    }

    /// Sessions currently alive
    #[inline]
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Sessions created since the tracker was built
    #[inline]
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

/// Keeps one session counted as live until dropped
#[derive(Debug)]
pub struct SessionGuard {
    id: u64,
    tracker: Arc<ConnectionTracker>,
}

impl SessionGuard {
    /// Sequential session id, starting at 1
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.tracker.active.fetch_sub(1, Ordering::SeqCst);
    }
}
