//! Connectivity state tracking.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Observed change in connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Connectivity came back.
    WentOnline,
    /// Connectivity was lost.
    WentOffline,
}

/// Current online/offline state plus a stream of changes.
///
/// The host feeds it from the platform connectivity signal via
/// [`NetworkMonitor::set_online`]. Clones observe and update the same state.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Records the latest connectivity report.
    ///
    /// Returns the transition only when the state actually flipped.
    pub fn set_online(&self, online: bool) -> Option<Transition> {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if !changed {
            return None;
        }
        info!(online, "connectivity changed");
        Some(if online {
            Transition::WentOnline
        } else {
            Transition::WentOffline
        })
    }

    /// Receiver that wakes on every state flip.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
