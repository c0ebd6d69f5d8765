use std::net::SocketAddr;

use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total wire requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "veranda_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "veranda_request_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "veranda_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "veranda_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "veranda_connections_rejected_total";

/// Counter: Paid bookings the sweeper promoted to Completed.
pub const STAYS_COMPLETED_TOTAL: &str = "veranda_stays_completed_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "veranda_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "veranda_wal_flush_batch_size";

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

/// Map a Request variant to a short label for metrics.
pub fn op_label(req: &Request) -> &'static str {
    match req {
        Request::CreateRoom { .. } => "create_room",
        Request::UpdateRoom { .. } => "update_room",
        Request::DefineAddon { .. } => "define_addon",
        Request::RepriceAddon { .. } => "reprice_addon",
        Request::RetireAddon { .. } => "retire_addon",
        Request::CreateBooking { .. } => "create_booking",
        Request::RecordPayment { .. } => "record_payment",
        Request::CancelBooking { .. } => "cancel_booking",
        Request::CheckAvailability { .. } => "check_availability",
        Request::OpenWindows { .. } => "open_windows",
        Request::ListRooms => "list_rooms",
        Request::ListAddons => "list_addons",
        Request::GetBooking { .. } => "get_booking",
        Request::Watch { .. } => "watch",
    }
}
