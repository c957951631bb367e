use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservations admitted.
pub const RESERVATIONS_TOTAL: &str = "prenota_reservations_total";

/// Counter: reservations refused because live claims saturated the slot.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "prenota_reservation_conflicts_total";

/// Counter: lifecycle transitions applied. Labels: event.
pub const TRANSITIONS_TOTAL: &str = "prenota_transitions_total";

/// Counter: cancellations applied. Labels: by, tier.
pub const CANCELLATIONS_TOTAL: &str = "prenota_cancellations_total";

/// Histogram: cents refunded per cancellation.
pub const REFUND_CENTS: &str = "prenota_refund_cents";

// ── USE metrics (engine utilization) ──────────────────────────

/// Gauge: spaces currently registered.
pub const SPACES_ACTIVE: &str = "prenota_spaces_active";

/// Counter: pending holds expired past their deadline.
pub const HOLDS_EXPIRED_TOTAL: &str = "prenota_holds_expired_total";

/// Counter: journal compactions completed.
pub const JOURNAL_COMPACTIONS_TOTAL: &str = "prenota_journal_compactions_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "prenota_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "prenota_journal_flush_batch_size";

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
