//! Periodic pool health checking.
//!
//! # Responsibilities
//! - Probe the pool on a fixed period
//! - Log healthy ↔ unhealthy transitions (not every probe)
//! - Stop when shutdown is triggered

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::database::pool::{Database, HEALTH_CHECK_PERIOD, HEALTH_CHECK_TIMEOUT};
use crate::error::Error;

/// A resource with a bounded liveness probe.
pub trait Liveness: Send + Sync + 'static {
    fn probe(&self, timeout: Duration) -> impl Future<Output = Result<(), Error>> + Send;
}

impl Liveness for Database {
    async fn probe(&self, timeout: Duration) -> Result<(), Error> {
        self.health_check(timeout).await
    }
}

/// Background task that keeps probing a pool until shutdown.
pub struct PoolHealthMonitor<L> {
    target: L,
    period: Duration,
    timeout: Duration,
    healthy: Arc<AtomicBool>,
}

impl<L: Liveness> PoolHealthMonitor<L> {
    pub fn new(target: L) -> Self {
        Self::with_period(target, HEALTH_CHECK_PERIOD, HEALTH_CHECK_TIMEOUT)
    }

    pub fn with_period(target: L, period: Duration, timeout: Duration) -> Self {
        Self {
            target,
            period,
            timeout,
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Shared flag reflecting the last probe result.
    pub fn status(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.healthy)
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(period = ?self.period, "pool health monitor starting");

        let mut ticker = time::interval(self.period);
        // The first tick completes immediately; the pool was just probed by `open`.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("pool health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn check(&self) {
        let result = self.target.probe(self.timeout).await;
        let was_healthy = self.healthy.swap(result.is_ok(), Ordering::SeqCst);

        match (was_healthy, result) {
            (true, Err(e)) => tracing::error!(error = %e, "database became unreachable"),
            (false, Ok(())) => tracing::info!("database reachable again"),
            (false, Err(e)) => tracing::debug!(error = %e, "database still unreachable"),
            (true, Ok(())) => {}
        }
    }
}
