//! Dispatcher: wires subscriber, queue and worker pool for one run.

use tracing::{info, warn};

use crate::config::DispatcherConfig;
use crate::engine::pool::{StatsSnapshot, WorkerPool};
use crate::engine::router::Router;
use crate::engine::strategy::Strategy;
use crate::error::Result;
use crate::lifecycle::Lifecycle;
use crate::queue::DispatchQueue;
use crate::subscriber::{NotificationSource, Subscriber};

pub struct Dispatcher {
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self { config }
    }

    /// Run until shutdown is requested, then wait for in-flight work.
    ///
    /// Items still queued at shutdown are discarded. A forced exit stops
    /// waiting and abandons the running tools.
    pub async fn run<S: NotificationSource>(
        &self,
        source: S,
        lifecycle: &Lifecycle,
    ) -> Result<StatsSnapshot> {
        let queue = DispatchQueue::new();
        let pool = WorkerPool::spawn(
            self.config.workers,
            queue.clone(),
            Router::from_config(&self.config),
            Strategy::from_config(&self.config.backend),
            lifecycle.token(),
        );
        let stats = pool.stats();

        let received = Subscriber::new(source, queue.clone(), lifecycle.clone())
            .recv_timeout(self.config.recv_timeout)
            .with_stats(pool.stats())
            .run()
            .await;
        if received.is_err() {
            lifecycle.shutdown();
        }

        info!(
            active = stats.snapshot().active,
            discarded = queue.len(),
            "shutting down, waiting for in-flight work"
        );
        let force = lifecycle.force_token();
        let drained = tokio::select! {
            drained = pool.drain(self.config.drain_timeout) => drained,
            _ = force.cancelled() => false,
        };
        if !drained {
            warn!("exiting before all in-flight work finished");
        }

        received?;
        Ok(stats.snapshot())
    }
}
