//! Connection lifecycle state machine and the derived editing lock.
//!
//! The editing lock is recomputed from scratch after every relevant event
//! rather than patched incrementally, so the flags can never drift apart.
//! Two named watchdogs bound the waits this machine would otherwise make
//! unbounded: the first transport connection, and the first realtime sync.

use crate::transport::{ConnectionEvent, DisconnectReason};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Raw websocket status reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebsocketStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// State the editing lock is derived from.
///
/// `errored_sync` is sticky until the transport acks all outstanding
/// messages and reports the ledger clean again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLifecycle {
    pub status: WebsocketStatus,
    /// Realtime channel has synced (or was forced ready by the sync
    /// watchdog in degraded mode).
    pub realtime_ready: bool,
    /// The controller's own backend load finished.
    pub backend_ready: bool,
    /// The transport's ack ledger holds errored messages.
    pub errored_sync: bool,
}

impl ConnectionLifecycle {
    pub fn new() -> Self {
        Self {
            status: WebsocketStatus::Disconnected,
            realtime_ready: false,
            backend_ready: false,
            errored_sync: false,
        }
    }

    /// Apply a transport lifecycle event.
    ///
    /// Returns the disconnect reason when the event was a disconnect, so the
    /// caller can route stale-commit closures to recovery.
    pub fn apply(&mut self, event: ConnectionEvent) -> Option<DisconnectReason> {
        match event {
            ConnectionEvent::Connecting => {
                self.status = WebsocketStatus::Connecting;
                self.realtime_ready = false;
                None
            }
            ConnectionEvent::Connected => {
                self.status = WebsocketStatus::Connected;
                None
            }
            ConnectionEvent::Disconnected { reason } => {
                self.status = WebsocketStatus::Disconnected;
                self.realtime_ready = false;
                Some(reason)
            }
        }
    }

    /// Pure derivation of the editing lock. Editing is unlocked only when
    /// the socket is connected, both readiness flags are set, and the ack
    /// ledger is clean; any single condition failing locks editing.
    pub fn editing_locked(&self) -> bool {
        !(self.status == WebsocketStatus::Connected
            && self.realtime_ready
            && self.backend_ready
            && !self.errored_sync)
    }
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// A named, bounded timer that forces a fallback transition if an expected
/// event does not occur in time. Disarmed (aborted) the moment the guarded
/// condition arrives early; watchdogs are the only explicit cancellation
/// tokens in this design.
pub struct Watchdog {
    name: &'static str,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Watchdog {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: Mutex::new(None),
        }
    }

    /// Arm the watchdog. Re-arming replaces any previous timer.
    pub fn arm<F>(&self, timeout: Duration, on_expiry: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = self.name;
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            debug!(watchdog = name, "watchdog expired");
            on_expiry.await;
        });
        let mut guard = self.handle.lock().expect("watchdog handle poisoned");
        if let Some(previous) = guard.replace(task) {
            previous.abort();
        }
    }

    /// Cancel the timer if it has not fired yet.
    pub fn disarm(&self) {
        let mut guard = self.handle.lock().expect("watchdog handle poisoned");
        if let Some(task) = guard.take() {
            task.abort();
            debug!(watchdog = self.name, "watchdog disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle
            .lock()
            .expect("watchdog handle poisoned")
            .is_some()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(task) = self.handle.lock().expect("watchdog handle poisoned").take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn editing_lock_truth_table() {
        // (status, realtime_ready, backend_ready, errored_sync) -> locked
        let cases = [
            (WebsocketStatus::Connected, true, true, false, false),
            (WebsocketStatus::Connected, true, true, true, true),
            (WebsocketStatus::Connected, true, false, false, true),
            (WebsocketStatus::Connected, false, true, false, true),
            (WebsocketStatus::Connected, false, false, true, true),
            (WebsocketStatus::Connecting, true, true, false, true),
            (WebsocketStatus::Disconnected, true, true, false, true),
            (WebsocketStatus::Disconnected, false, false, false, true),
        ];
        for (status, realtime_ready, backend_ready, errored_sync, locked) in cases {
            let lifecycle = ConnectionLifecycle {
                status,
                realtime_ready,
                backend_ready,
                errored_sync,
            };
            assert_eq!(
                lifecycle.editing_locked(),
                locked,
                "case {status:?}/{realtime_ready}/{backend_ready}/{errored_sync}"
            );
        }
    }

    #[test]
    fn connecting_locks_and_clears_realtime_ready() {
        let mut lifecycle = ConnectionLifecycle {
            status: WebsocketStatus::Connected,
            realtime_ready: true,
            backend_ready: true,
            errored_sync: false,
        };
        assert!(!lifecycle.editing_locked());
        lifecycle.apply(ConnectionEvent::Connecting);
        assert!(lifecycle.editing_locked());
        assert!(!lifecycle.realtime_ready);
    }

    #[test]
    fn disconnect_returns_reason_for_routing() {
        let mut lifecycle = ConnectionLifecycle::new();
        let reason = lifecycle.apply(ConnectionEvent::Disconnected {
            reason: DisconnectReason::StaleCommit,
        });
        assert_eq!(reason, Some(DisconnectReason::StaleCommit));
        assert_eq!(lifecycle.status, WebsocketStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_fires_after_timeout() {
        let fired = Arc::new(AtomicBool::new(false));
        let watchdog = Watchdog::new("test");
        let flag = fired.clone();
        watchdog.arm(Duration::from_secs(1), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_watchdog_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let watchdog = Watchdog::new("test");
        let flag = fired.clone();
        watchdog.arm(Duration::from_secs(1), async move {
            flag.store(true, Ordering::SeqCst);
        });
        watchdog.disarm();
        assert!(!watchdog.is_armed());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
