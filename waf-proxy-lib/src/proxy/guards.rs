use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::telemetry::Metrics;

/// Tracks one live connection for graceful shutdown
///
/// Notifies the accept loop when the last connection closes.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
    metrics: Option<Arc<Metrics>>,
}

impl ConnectionGuard {
    pub fn new(
        counter: Arc<AtomicUsize>,
        notifier: watch::Sender<()>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        if let Some(m) = &metrics {
            m.record_connection();
        }
        Self { counter, notifier, metrics }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let remaining = self.counter.fetch_sub(1, Ordering::Relaxed);
        if let Some(m) = &self.metrics {
            m.record_connection_closed();
        }
        if remaining == 1 {
            let _ = self.notifier.send(());
        }
    }
}
