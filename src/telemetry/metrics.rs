//! Metric instrument factories for pcap-dispatcher.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("pcap-dispatcher")
}

/// Counter: notifications decoded and queued.
pub fn items_received() -> Counter<u64> {
    meter()
        .u64_counter("pcap.items.received")
        .with_description("Capture notifications accepted into the dispatch queue")
        .build()
}

/// Counter: items discarded without running a tool.
/// Labels: `reason` ("decode" | "stale" | "not_selected").
pub fn items_dropped() -> Counter<u64> {
    meter()
        .u64_counter("pcap.items.dropped")
        .with_description("Capture notifications discarded before processing")
        .build()
}

/// Counter: external tool invocations.
/// Labels: `backend`, `result` ("ok" | "failed" | "error").
pub fn tool_invocations() -> Counter<u64> {
    meter()
        .u64_counter("pcap.tool.invocations")
        .with_description("External tool invocations")
        .build()
}

/// Histogram: external tool runtime in milliseconds.
/// Labels: `backend`.
pub fn tool_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("pcap.tool.duration_ms")
        .with_description("External tool runtime in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: archive attempts.
/// Labels: `result` ("archived" | "empty" | "unavailable" | "error").
pub fn archives() -> Counter<u64> {
    meter()
        .u64_counter("pcap.archives")
        .with_description("Log archive packaging attempts")
        .build()
}
