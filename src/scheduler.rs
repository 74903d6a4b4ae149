//! Periodic fetch triggers, one timer task per entry with a default camera

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::client::FetchRequest;
use crate::error::FetchError;
use crate::registry::{Entry, EntryRegistry};

pub struct Scheduler {
    shutdown: Arc<watch::Sender<bool>>,
    handles: Vec<JoinHandle<()>>,
}

/// Flips the shared stop flag; timers and on-demand cycles watching it are abandoned
#[derive(Clone)]
pub struct StopHandle(Arc<watch::Sender<bool>>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.0.subscribe()
    }
}

/// Resolves once the stop flag is set; never resolves if its sender is gone
pub async fn stopped(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

impl Scheduler {
    /// Start timers; the first cycle of each entry runs immediately
    pub fn start(registry: &EntryRegistry) -> Self {
        let shutdown = Arc::new(watch::channel(false).0);
        let mut handles = Vec::new();

        for entry in registry.iter() {
            let Some(request) = entry.scheduled_request() else {
                info!(entry_id = %entry.id(), "No default camera, timer disabled");
                continue;
            };

            let period = entry.config().fetch_interval();
            handles.push(tokio::spawn(run_timer(
                entry.clone(),
                request,
                period,
                shutdown.subscribe(),
            )));
        }

        Self { shutdown, handles }
    }

    pub fn active_timers(&self) -> usize {
        self.handles.len()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.shutdown.clone())
    }

    /// Stop all timers, dropping any in-flight cycle
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Scheduler stopped");
    }
}

async fn run_timer(
    entry: Arc<Entry>,
    request: FetchRequest,
    period: Duration,
    shutdown: watch::Receiver<bool>,
) {
    info!(
        entry_id = %entry.id(),
        camera_id = %request.camera_id,
        period_secs = period.as_secs(),
        "Starting fetch timer"
    );

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stopped(shutdown.clone()) => break,
        }

        tokio::select! {
            result = entry.coordinator().run_cycle(request.clone()) => {
                // Outcomes are logged by the coordinator; no retry before the next tick.
                if let Err(FetchError::ConcurrentCycle { .. }) = result {
                    debug!(entry_id = %entry.id(), "Scheduled cycle skipped, another is running");
                }
            }
            _ = stopped(shutdown.clone()) => break,
        }
    }

    debug!(entry_id = %entry.id(), "Fetch timer stopped");
}
