//! Worker pool: pops items from the dispatch queue, routes them, and runs
//! the backend strategy.

use opentelemetry::KeyValue;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use crate::engine::router::Router;
use crate::engine::strategy::{Outcome, Strategy};
use crate::model::WorkItem;
use crate::queue::DispatchQueue;
use crate::telemetry::item::{record_outcome, start_item_span};
use crate::telemetry::metrics;

/// Counters shared by all workers, read for state snapshots.
#[derive(Debug, Default)]
pub struct PoolStats {
    active: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    stale: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`PoolStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub active: usize,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub stale: u64,
    pub errors: u64,
}

impl PoolStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            active: self.active.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Completed => &self.completed,
            Outcome::ToolFailed => &self.failed,
            Outcome::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A fixed set of worker tasks sharing one queue.
pub struct WorkerPool {
    tasks: JoinSet<()>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Start `workers` (at least one) workers.
    pub fn spawn(
        workers: usize,
        queue: DispatchQueue,
        router: Router,
        strategy: Strategy,
        token: CancellationToken,
    ) -> Self {
        let stats = Arc::new(PoolStats::default());
        let router = Arc::new(router);
        let strategy = Arc::new(strategy);

        let mut tasks = JoinSet::new();
        for id in 1..=workers.max(1) {
            let worker = Worker {
                id,
                queue: queue.clone(),
                router: Arc::clone(&router),
                strategy: Arc::clone(&strategy),
                token: token.clone(),
                stats: Arc::clone(&stats),
            };
            tasks.spawn(worker.run());
        }
        info!(workers = tasks.len(), backend = %strategy.backend(), "worker pool started");

        Self { tasks, stats }
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for every worker to exit after cancellation.
    ///
    /// Returns `false` if `timeout` elapsed with work still in flight.
    pub async fn drain(mut self, timeout: Option<Duration>) -> bool {
        let tasks = &mut self.tasks;
        let join_all = async move {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined
                    && e.is_panic()
                {
                    error!("worker panicked: {e}");
                }
            }
        };

        match timeout {
            None => {
                join_all.await;
                true
            }
            Some(limit) => match tokio::time::timeout(limit, join_all).await {
                Ok(()) => true,
                Err(_) => {
                    warn!(
                        active = self.stats.snapshot().active,
                        "drain timeout elapsed with work in flight"
                    );
                    false
                }
            },
        }
    }
}

struct Worker {
    id: usize,
    queue: DispatchQueue,
    router: Arc<Router>,
    strategy: Arc<Strategy>,
    token: CancellationToken,
    stats: Arc<PoolStats>,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, "worker started");
        while let Some(item) = self.queue.pop(&self.token).await {
            self.handle(item).await;
        }
        debug!(worker = self.id, "worker finished");
    }

    async fn handle(&self, item: WorkItem) {
        if !item.exists().await {
            debug!(worker = self.id, path = %item.path.display(), "capture file gone, dropping");
            self.stats.stale.fetch_add(1, Ordering::Relaxed);
            metrics::items_dropped().add(1, &[KeyValue::new("reason", "stale")]);
            return;
        }

        let route = self.router.route(item);
        let backend = self.strategy.backend().to_string();
        let span = start_item_span(&backend, self.id, &Uuid::new_v4(), &route.path);
        span.in_scope(|| debug!(tags = ?route.tags, mode = %route.extract_mode, "routed"));

        self.stats.active.fetch_add(1, Ordering::Relaxed);
        let result = self.strategy.process(&route).instrument(span.clone()).await;
        self.stats.active.fetch_sub(1, Ordering::Relaxed);

        match result {
            Ok(outcome) => {
                self.stats.record(outcome);
                record_outcome(&span, outcome.as_str());
            }
            Err(e) => {
                span.in_scope(|| warn!(error = %e, "processing error"));
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                metrics::tool_invocations().add(
                    1,
                    &[
                        KeyValue::new("backend", backend),
                        KeyValue::new("result", "error"),
                    ],
                );
                record_outcome(&span, "error");
            }
        }
    }
}
