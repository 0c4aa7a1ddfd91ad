use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: admission attempts. Labels: outcome (admitted, overlap).
pub const ADMISSIONS_TOTAL: &str = "salonbook_admissions_total";

/// Counter: bookings cancelled.
pub const CANCELLATIONS_TOTAL: &str = "salonbook_cancellations_total";

/// Counter: bookings marked completed.
pub const COMPLETIONS_TOTAL: &str = "salonbook_completions_total";

/// Counter: payment ledger calls that failed after the booking committed. Labels: op.
pub const PAYMENT_FAILURES_TOTAL: &str = "salonbook_payment_failures_total";

/// Counter: slot grids computed.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "salonbook_availability_queries_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: salons with at least one admitted interval.
pub const SALONS_ACTIVE: &str = "salonbook_salons_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "salonbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "salonbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
