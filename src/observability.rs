use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total HTTP requests served. Labels: route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "haven_http_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "haven_http_request_duration_seconds";

/// Counter: bookings or reschedules rejected for overlapping an active appointment.
pub const BOOKING_CONFLICTS_TOTAL: &str = "haven_booking_conflicts_total";

// ── Cache ───────────────────────────────────────────────────────

/// Counter: read-through cache hits. Labels: scope.
pub const CACHE_HITS_TOTAL: &str = "haven_cache_hits_total";

/// Counter: read-through cache misses. Labels: scope.
pub const CACHE_MISSES_TOTAL: &str = "haven_cache_misses_total";

/// Counter: keys removed by write-triggered invalidation.
pub const CACHE_INVALIDATED_KEYS_TOTAL: &str = "haven_cache_invalidated_keys_total";

/// Counter: expired keys removed by the sweeper.
pub const CACHE_EXPIRED_KEYS_TOTAL: &str = "haven_cache_expired_keys_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "haven_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "haven_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "haven_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
///
/// A failed install is logged and the server keeps running without an exporter.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus exporter on {addr}: {e}"),
    }
}
