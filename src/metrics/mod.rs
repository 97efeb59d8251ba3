//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Sign and broadcast outcomes
//! - Form validation failures
//! - RPC latency
//! - Network health and open sessions

use crate::error::{ComposerError, ComposerResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Network metrics
    pub static ref NETWORK_HEALTHY: GaugeVec = register_gauge_vec!(
        "tx_composer_network_healthy",
        "Network reachability (1=healthy, 0=unreachable)",
        &["network"]
    ).unwrap();

    // Submission metrics
    pub static ref SIGN_REQUESTS: CounterVec = register_counter_vec!(
        "tx_composer_sign_requests_total",
        "Sign requests by outcome",
        &["network", "outcome"]
    ).unwrap();

    pub static ref BROADCASTS: CounterVec = register_counter_vec!(
        "tx_composer_broadcasts_total",
        "Broadcast attempts by outcome",
        &["network", "outcome"]
    ).unwrap();

    pub static ref VALIDATION_FAILURES: CounterVec = register_counter_vec!(
        "tx_composer_validation_failures_total",
        "Rejected form submissions by field",
        &["field"]
    ).unwrap();

    pub static ref RPC_LATENCY: HistogramVec = register_histogram_vec!(
        "tx_composer_rpc_latency_seconds",
        "Latency of outbound RPC calls",
        &["method"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    // Session metrics
    pub static ref ACTIVE_SESSIONS: Gauge = register_gauge!(
        "tx_composer_active_sessions",
        "Open form sessions"
    ).unwrap();

    // Health metrics
    pub static ref HEALTH_CHECKS: CounterVec = register_counter_vec!(
        "tx_composer_health_checks_total",
        "Health check rounds by result",
        &["result"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> ComposerResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ComposerError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| ComposerError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    render().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Encode every registered metric in the Prometheus text format
pub fn render() -> ComposerResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ComposerError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| ComposerError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_network_health(network: &str, healthy: bool) {
    NETWORK_HEALTHY
        .with_label_values(&[network])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_sign(network: &str, outcome: &str) {
    SIGN_REQUESTS.with_label_values(&[network, outcome]).inc();
}

pub fn record_broadcast(network: &str, outcome: &str) {
    BROADCASTS.with_label_values(&[network, outcome]).inc();
}

pub fn record_validation_failure(field: &str) {
    VALIDATION_FAILURES.with_label_values(&[field]).inc();
}

pub fn set_active_sessions(count: usize) {
    ACTIVE_SESSIONS.set(count as f64);
}

pub fn record_health_check(all_healthy: bool) {
    let result = if all_healthy { "healthy" } else { "degraded" };
    HEALTH_CHECKS.with_label_values(&[result]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_recorded_metrics() {
        record_sign("metrics-test", "signed");
        record_validation_failure("gasPrice");

        let text = render().unwrap();
        assert!(text.contains("tx_composer_sign_requests_total"));
        assert!(text.contains("network=\"metrics-test\""));
        assert!(text.contains("tx_composer_validation_failures_total"));
    }
}
