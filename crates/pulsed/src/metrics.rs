use axum::{http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Readiness check response.
#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    ready: bool,
}

/// Shared readiness state.
#[derive(Clone, Default)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a new health state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the service as ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Check if the service is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

/// # Errors
///
/// Returns an error if binding the metrics HTTP server fails.
pub async fn start_metrics_server(
    addr: SocketAddr,
    health_state: HealthState,
) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let app = Router::new()
        .route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
        .route("/health", get(health_handler))
        .route("/ready", get(move || ready_handler(health_state.clone())));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Health check handler - returns 200 if server is running.
async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse { status: "healthy" }))
}

/// Readiness check handler - returns 200 if ready, 503 if not.
async fn ready_handler(state: HealthState) -> (StatusCode, Json<ReadyResponse>) {
    if state.is_ready() {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready",
                ready: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "not ready",
                ready: false,
            }),
        )
    }
}

/// Connection count gauges.
pub mod gauges {
    /// Increment the active connections gauge for a role.
    pub fn inc_connections(role: &'static str) {
        metrics::gauge!("pulse_connections_active", "role" => role).increment(1.0);
    }

    /// Decrement the active connections gauge for a role.
    pub fn dec_connections(role: &'static str) {
        metrics::gauge!("pulse_connections_active", "role" => role).decrement(1.0);
    }
}

/// Event counters.
pub mod counters {
    /// Record a login attempt with the given role and status labels.
    pub fn logins_total(role: &'static str, status: &'static str) {
        metrics::counter!("pulse_logins_total", "role" => role, "status" => status).increment(1);
    }

    /// Increment the dropped-frames counter with the given reason label.
    pub fn frames_dropped_total(reason: &'static str) {
        metrics::counter!("pulse_frames_dropped_total", "reason" => reason).increment(1);
    }

    /// Increment the relayed-telemetry counter.
    pub fn telemetry_relayed_total() {
        metrics::counter!("pulse_telemetry_relayed_total").increment(1);
    }

    /// Increment the heartbeats-sent counter by the number of recipients.
    pub fn heartbeats_sent_total(recipients: u64) {
        metrics::counter!("pulse_heartbeats_sent_total").increment(recipients);
    }

    /// Record sinks evicted after a failed delivery, per role.
    pub fn sinks_evicted_total(role: &'static str, count: u64) {
        metrics::counter!("pulse_sinks_evicted_total", "role" => role).increment(count);
    }

    /// Increment the issued pairing keys counter.
    pub fn pairing_keys_issued_total() {
        metrics::counter!("pulse_pairing_keys_issued_total").increment(1);
    }

    /// Record a pairing key redemption attempt with the given status label.
    pub fn pairing_keys_redeemed_total(status: &'static str) {
        metrics::counter!("pulse_pairing_keys_redeemed_total", "status" => status).increment(1);
    }

    /// Increment the expired pairing keys counter.
    pub fn pairing_keys_expired() {
        metrics::counter!("pulse_pairing_keys_expired_total").increment(1);
    }

    /// Record a static-data write-through with the given status label.
    pub fn static_data_persisted_total(status: &'static str) {
        metrics::counter!("pulse_static_data_persisted_total", "status" => status).increment(1);
    }
}

/// Latency histograms.
pub mod histograms {
    /// Record a telemetry fan-out latency observation in seconds.
    pub fn relay_fanout_seconds(value: f64) {
        metrics::histogram!("pulse_relay_fanout_seconds").record(value);
    }
}
