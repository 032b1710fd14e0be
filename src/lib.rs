//! # pcap-dispatcher
//!
//! Subscribes to new-capture notifications and routes each capture file to a
//! capture-indexing or traffic-analysis tool, running a bounded pool of
//! workers that invoke the tool as a subprocess.
//!
//! Provides the dispatch queue, tag router, processing strategies, log
//! archiving, lifecycle control, and OpenTelemetry observability.

pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod queue;
pub mod subscriber;
pub mod telemetry;
