//! Core module - orchestration, event queue and the adaptive watch scheduler

mod engine;
mod event_bus;
mod scheduler;

pub use engine::{Engine, EngineOptions};
pub use event_bus::EventQueue;
pub use scheduler::{
    dedupe_events, format_alert, is_all_clear, summarize_events, ActivityHook, Watcher,
    WatcherStatus,
};

use std::sync::Arc;
use tokio::sync::watch;

/// Report text meaning "nothing worth alerting on"
pub const WATCH_OK: &str = "WATCH_OK";

/// Cooperative stop flag shared by long-lived loops.
///
/// Cloning shares the flag. `stop()` is idempotent and may be called from
/// any thread; every pending [`StopSignal::stopped`] future completes.
#[derive(Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolves once the signal has been raised.
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        wait_stopped(&mut rx).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once `rx` observes `true` or its sender is gone.
pub(crate) async fn wait_stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}
