use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::services::FileStore;

/// Counts from one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub retired: usize,
    pub failed: usize,
}

/// Periodically retires files whose expiry has passed
pub struct ExpiryReaper {
    store: Arc<FileStore>,
    interval: Duration,
}

impl ExpiryReaper {
    pub fn new(store: Arc<FileStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Retire every live record expired at `now`.
    /// A failing record is logged and skipped.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let expired = self.store.list_expired(now).await?;
        let mut report = SweepReport::default();

        for file in expired {
            match self.store.mark_consumed(&file.id).await {
                Ok(true) => report.retired += 1,
                // Consumed concurrently by a download or the gate
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Failed to retire expired file {}: {}", file.id, e);
                }
            }
        }

        Ok(report)
    }

    /// Run sweeps on the interval until `cancel` fires
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!("Expiry reaper running every {:?}", self.interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match self.sweep(Utc::now()).await {
                            Ok(report) if report.retired > 0 || report.failed > 0 => {
                                tracing::info!(
                                    "Expiry sweep retired {} file(s), {} failure(s)",
                                    report.retired,
                                    report.failed
                                );
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!("Expiry sweep failed: {}", e),
                        }
                    }
                }
            }

            tracing::info!("Expiry reaper stopped");
        })
    }
}
