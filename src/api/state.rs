use std::sync::Arc;
use tokio::sync::watch;

use crate::observability::Metrics;
use crate::registry::EntryRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<EntryRegistry>,
    pub metrics: Arc<Metrics>,
    /// Set once shutdown begins; on-demand cycles still running are abandoned
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(registry: Arc<EntryRegistry>, metrics: Arc<Metrics>) -> Self {
        // Sender dropped: this state never sees a shutdown
        let (_, shutdown) = watch::channel(false);
        Self {
            registry,
            metrics,
            shutdown,
        }
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }
}
