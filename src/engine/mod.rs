//! Processing engine: routing, tool strategies, archiving, worker pool.

pub mod archive;
pub mod dispatcher;
pub mod pool;
pub mod router;
pub mod strategy;
pub mod tool;
pub mod workspace;

pub use dispatcher::Dispatcher;
pub use pool::{PoolStats, StatsSnapshot, WorkerPool};
pub use router::{Route, Router};
pub use strategy::{Outcome, Strategy};
