//! Prometheus exposition.

use axum::extract::State;

use crate::state::SharedState;

/// GET /metrics
pub async fn metrics(State(state): State<SharedState>) -> String {
    state.metrics.render()
}
