use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether the host's background loops are alive, with the current phase.
pub fn health_status(state: &SharedState) -> HealthResponse {
    let phase = state.host().snapshot().phase;
    if state.host().is_running() {
        HealthResponse::ok(phase)
    } else {
        warn!(?phase, "host loops are not running (degraded mode)");
        HealthResponse::degraded(phase)
    }
}
