//! Background re-ingestion of the primary source.

use dc_types::{DcResult, Source};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::ingest::Ingestor;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically refreshes one source's cache entry until cancelled.
#[derive(Debug, Clone)]
pub struct RefreshLoop {
    ingestor: Arc<Ingestor>,
    source: Source,
    interval: Duration,
}

impl RefreshLoop {
    pub fn new(ingestor: Arc<Ingestor>, source: Source) -> Self {
        Self {
            ingestor,
            source,
            interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One refresh cycle; returns the number of rows now cached.
    pub async fn run_once(&self) -> DcResult<usize> {
        let table = self.ingestor.refresh(&self.source).await?;
        Ok(table.len())
    }

    /// Refresh immediately, then every interval until `shutdown` fires.
    ///
    /// A failed cycle is logged and the loop keeps going. A cycle that has
    /// started always completes before cancellation is observed.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            source = %self.source,
            interval_secs = self.interval.as_secs(),
            "Starting refresh loop"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.run_once().await {
                Ok(rows) => info!(source = %self.source, rows, "Refresh cycle complete"),
                Err(e) => error!(source = %self.source, error = %e, "Refresh cycle failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(source = %self.source, "Refresh loop stopped");
    }
}

/// Run `refresh_loop` on the runtime; await the handle after cancelling.
pub fn spawn_refresh_loop(refresh_loop: RefreshLoop, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(refresh_loop.run(shutdown))
}
