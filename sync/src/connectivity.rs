//! Connectivity monitoring.
//!
//! Tracks reachable/unreachable transitions and exposes them over a watch
//! channel. Redundant signals (several sources reporting "online" in a row)
//! are deduplicated so subscribers see exactly one event per genuine
//! transition. None of the sources bypass the coordinator's single-flight
//! guarantee - they only nudge it.

use tokio::sync::watch;

/// Observes network reachability and surfaces transition events.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the given initial reachability.
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    /// Current reachability.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Feed a reachability signal from any source (OS callback, probe,
    /// foreground transition). Subscribers are only notified when the value
    /// actually changes.
    pub fn set_reachable(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
    }

    /// Subscribe to reachability transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        // Assume reachable until a signal says otherwise; the first failed
        // request corrects this immediately.
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transition_notifies_subscriber() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        monitor.set_reachable(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn redundant_signal_is_suppressed() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();
        rx.borrow_and_update();

        monitor.set_reachable(true);
        monitor.set_reachable(true);
        assert!(!rx.has_changed().unwrap());

        monitor.set_reachable(false);
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn flapping_counts_each_genuine_transition() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();
        rx.borrow_and_update();

        monitor.set_reachable(false);
        monitor.set_reachable(true);

        // watch coalesces, but the latest value is visible.
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
    }
}
