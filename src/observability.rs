use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking requests admitted. Labels: none.
pub const BOOKINGS_REQUESTED_TOTAL: &str = "slotbook_bookings_requested_total";

/// Counter: booking requests that lost to an existing active booking.
pub const BOOKING_CONFLICTS_TOTAL: &str = "slotbook_booking_conflicts_total";

/// Counter: lifecycle transitions applied. Labels: action.
pub const TRANSITIONS_TOTAL: &str = "slotbook_transitions_total";

/// Counter: availability queries served.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "slotbook_availability_queries_total";

// ── Sweeper metrics ─────────────────────────────────────────────

/// Counter: pending bookings auto-expired by the sweeper or lazy reads.
pub const BOOKINGS_EXPIRED_TOTAL: &str = "slotbook_bookings_expired_total";

/// Histogram: duration of one sweep pass in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "slotbook_sweep_duration_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
