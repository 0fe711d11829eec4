//! Offline mode gate.
//!
//! `OfflineMode` is a shared flag injected into every site. While it is set,
//! any call that would reach a remote service is refused before it is
//! attempted. Cache-only reads are unaffected. Observers can subscribe to
//! flag changes; notifications use a bounded channel and never block the
//! caller toggling the flag.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::error::{SiteError, SiteResult};

const SUBSCRIBER_CAPACITY: usize = 16;

#[derive(Debug, Default)]
struct Inner {
    offline: AtomicBool,
    subscribers: Mutex<Vec<Sender<bool>>>,
    dropped_notifications: AtomicU64,
}

/// Process-wide offline switch, shared by cloning.
///
/// A call that passed [`OfflineMode::ensure_online`] before the flag flipped
/// is allowed to complete.
#[derive(Debug, Clone, Default)]
pub struct OfflineMode {
    inner: Arc<Inner>,
}

impl OfflineMode {
    /// Creates a gate in online mode.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag. Subscribers are notified only on actual changes.
    pub fn set_offline(&self, offline: bool) {
        let previous = self.inner.offline.swap(offline, Ordering::AcqRel);
        if previous == offline {
            return;
        }
        if offline {
            tracing::info!("offline mode enabled; remote sites will not be contacted");
        } else {
            tracing::info!("offline mode disabled");
        }
        self.notify(offline);
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.inner.offline.load(Ordering::Acquire)
    }

    /// Fails with `SiteError::Offline` if offline mode is active.
    ///
    /// Must be called immediately before issuing a remote call.
    pub fn ensure_online(&self, uri: &str, backend: &str) -> SiteResult<()> {
        if self.is_offline() {
            return Err(SiteError::Offline {
                uri: uri.to_string(),
                backend: backend.to_string(),
            });
        }
        Ok(())
    }

    /// Subscribes to flag changes. The receiver gets the new value after each change.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<bool> {
        let (tx, rx) = bounded(SUBSCRIBER_CAPACITY);
        if let Ok(mut subscribers) = self.inner.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    /// Number of change notifications dropped because a subscriber lagged.
    #[must_use]
    pub fn dropped_notifications(&self) -> u64 {
        self.inner.dropped_notifications.load(Ordering::Relaxed)
    }

    fn notify(&self, offline: bool) {
        let Ok(mut subscribers) = self.inner.subscribers.lock() else {
            return;
        };
        subscribers.retain(|tx| match tx.try_send(offline) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.inner.dropped_notifications.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}
