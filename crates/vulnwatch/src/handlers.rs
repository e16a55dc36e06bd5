//! HTTP request handlers: the scrape endpoint and the two probes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use tracing::error;

use vulnwatch_core::store::MetricsStore;

// ============================================================
// Metrics
// ============================================================

pub(crate) async fn handle_metrics(
    State(store): State<Arc<MetricsStore>>,
) -> Result<String, StatusCode> {
    store.encode().map_err(|e| {
        error!(error = %e, "metrics encoding failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

// ============================================================
// Probes
// ============================================================

pub(crate) async fn handle_healthz() -> &'static str {
    "ok"
}

/// 503 until the first sweep has published a snapshot, 200 afterwards. The
/// flag never clears again once set.
pub(crate) async fn handle_ready(
    State(store): State<Arc<MetricsStore>>,
) -> (StatusCode, &'static str) {
    if store.is_ready() {
        (StatusCode::OK, "true")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "false")
    }
}

// ============================================================
// Tests
// ============================================================
