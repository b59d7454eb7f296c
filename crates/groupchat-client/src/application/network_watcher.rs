//! Debounces raw link-change notifications into a single "network became
//! usable" signal.
//!
//! # Settle delay
//!
//! Link properties flap while DHCP negotiates, so a usable snapshot does not
//! trigger anything directly.  It schedules a re-check after the settle delay
//! (1000 ms by default).  The re-check fetches the *current* snapshot of the
//! same interface from the [`SnapshotSource`] and only calls the
//! [`TransitionHandler`] if that is still usable.
//!
//! # Coalescing
//!
//! Cancel-and-replace: a usable notification aborts any re-check that is
//! still waiting out its delay and schedules a new one.  A burst of
//! notifications therefore produces one handler call, one settle delay after
//! the last of them.  A re-check that has already reached the handler runs to
//! completion; the handler itself serialises with later calls.
//!
//! Unusable notifications are ignored and do not cancel a pending re-check.
//! The re-check looks at the network as it is when the delay ends.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use groupchat_core::{is_usable_network, NetworkSnapshot};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default settle delay between a usable notification and its re-check.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// Errors delivered on the notification stream in place of a snapshot.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Probing the current link state failed.
    #[error("link probe failed: {0}")]
    Probe(#[source] std::io::Error),

    /// The notification source reported a failure.
    #[error("notification error: {0}")]
    Notification(String),
}

/// Provides the network snapshot as it is right now.
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotSource: Send + Sync {
    /// Current snapshot of `interface`, or `None` if it has no addresses or
    /// is unknown.
    fn current(&self, interface: &str) -> Option<NetworkSnapshot>;
}

/// Called once a usable network has survived the settle delay.
///
/// Runs on a blocking thread and may block.
#[cfg_attr(test, mockall::automock)]
pub trait TransitionHandler: Send + Sync {
    fn on_usable_network(&self);
}

/// Debounces link notifications and drives a [`TransitionHandler`].
pub struct NetworkWatcher {
    settle_delay: Duration,
    source: Arc<dyn SnapshotSource>,
    handler: Arc<dyn TransitionHandler>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkWatcher {
    pub fn new(
        settle_delay: Duration,
        source: Arc<dyn SnapshotSource>,
        handler: Arc<dyn TransitionHandler>,
    ) -> Self {
        Self {
            settle_delay,
            source,
            handler,
            pending: Mutex::new(None),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handles one raw notification.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn on_link_changed(&self, snapshot: Option<&NetworkSnapshot>) {
        if !is_usable_network(snapshot) {
            debug!(
                interface = snapshot.map(|s| s.interface.as_str()),
                "link change without a usable address; ignoring"
            );
            return;
        }

        let mut pending = self.pending();
        if let Some(previous) = pending.take() {
            if !previous.is_finished() {
                debug!("replacing pending network re-check");
            }
            previous.abort();
        }

        let delay = self.settle_delay;
        let interface = snapshot.map(|s| s.interface.clone()).unwrap_or_default();
        let source = Arc::clone(&self.source);
        let handler = Arc::clone(&self.handler);
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if !is_usable_network(source.current(&interface).as_ref()) {
                info!("{interface} no longer usable after {delay:?} settle delay");
                return;
            }

            info!("usable network settled; refreshing channel");
            if let Err(e) = tokio::task::spawn_blocking(move || handler.on_usable_network()).await {
                error!("transition handler failed: {e}");
            }
        }));
    }

    /// Aborts a re-check that is still waiting out its delay.
    pub fn cancel_pending(&self) {
        if let Some(task) = self.pending().take() {
            task.abort();
        }
    }

    /// Consumes notifications until every sender is dropped.
    ///
    /// Notification errors are logged and skipped.
    pub async fn run(
        &self,
        mut notifications: mpsc::Receiver<Result<NetworkSnapshot, WatchError>>,
    ) {
        info!("network watcher started");
        while let Some(notification) = notifications.recv().await {
            match notification {
                Ok(snapshot) => self.on_link_changed(Some(&snapshot)),
                Err(e) => warn!("network notification error: {e}"),
            }
        }
        self.cancel_pending();
        info!("network watcher stopped");
    }
}

impl Drop for NetworkWatcher {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
