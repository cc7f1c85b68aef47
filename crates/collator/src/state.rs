//! Shared service state: the stop signal and the mutable status/config
//! record read across the three control loops.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Broadcast stop signal shared by the three service loops.
///
/// Every clone observes the same flag; the loops check it at their
/// iteration boundaries, nothing is interrupted mid-operation. The
/// transition is one-way: once set, the token stays cancelled for the
/// rest of the service lifetime.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    stopped: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh token in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// True once [`cancel`](Self::cancel) was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Tell every holder of this token to wind down.
    pub fn cancel(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Mutable state shared between the worker, settings and heartbeat loops.
///
/// The poll timeout is a lock-free scalar: the worker tolerates a read
/// that is stale by at most one settings-poll interval. The status string
/// is written only by the worker loop and read by the other two.
#[derive(Debug)]
pub struct ServiceState {
    poll_timeout_ms: AtomicU64,
    status: Mutex<String>,
}

impl ServiceState {
    pub fn new(poll_timeout_ms: u64) -> Self {
        Self {
            poll_timeout_ms: AtomicU64::new(poll_timeout_ms),
            status: Mutex::new(String::new()),
        }
    }

    pub fn poll_timeout_ms(&self) -> u64 {
        self.poll_timeout_ms.load(Ordering::Relaxed)
    }

    pub fn set_poll_timeout_ms(&self, ms: u64) {
        self.poll_timeout_ms.store(ms, Ordering::Relaxed);
    }

    pub fn status(&self) -> String {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn set_status(&self, status: impl Into<String>) {
        if let Ok(mut guard) = self.status.lock() {
            *guard = status.into();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_shared_across_clones() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());

        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn timeout_and_status_round_trip() {
        let state = ServiceState::new(1000);
        assert_eq!(state.poll_timeout_ms(), 1000);

        state.set_poll_timeout_ms(250);
        assert_eq!(state.poll_timeout_ms(), 250);

        assert_eq!(state.status(), "");
        state.set_status("scanner idle");
        assert_eq!(state.status(), "scanner idle");
    }
}
