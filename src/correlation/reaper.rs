use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, info};
use pingora_core::{server::ShutdownWatch, services::background::BackgroundService};
use tokio::{sync::watch, task::JoinHandle, time::interval};

use super::CorrelationStore;

/// Periodically purges results nobody collected within the wait window.
pub struct CorrelationReaper {
    store: Arc<CorrelationStore>,
    window: Duration,
    period: Duration,
}

impl CorrelationReaper {
    pub fn new(store: Arc<CorrelationStore>, window: Duration, period: Duration) -> Self {
        Self {
            store,
            window,
            period,
        }
    }

    /// Run until the shutdown watch flips to `true` or its sender is gone.
    pub async fn run(&self, mut shutdown: ShutdownWatch) {
        info!(
            "Starting correlation reaper (window {:?}, every {:?})",
            self.window, self.period
        );
        let mut ticker = interval(self.period);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received, stopping correlation reaper");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let reaped = self.store.reap_expired(self.window);
                    if reaped > 0 {
                        info!("Reaped {reaped} uncollected result(s)");
                    } else {
                        debug!("Reaper cycle found nothing to purge");
                    }
                }
            }
        }
    }

    /// Run on the current tokio runtime outside of a pingora server.
    pub fn spawn(self) -> ReaperHandle {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(rx).await });
        ReaperHandle { shutdown: tx, task }
    }
}

#[async_trait]
impl BackgroundService for CorrelationReaper {
    async fn start(&self, shutdown: ShutdownWatch) {
        self.run(shutdown).await;
    }
}

/// Explicit stop switch for a spawned reaper.
pub struct ReaperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            log::error!("Correlation reaper task failed: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
