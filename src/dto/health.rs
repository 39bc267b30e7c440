use serde::Serialize;
use utoipa::ToSchema;

use crate::state::state_machine::GamePhase;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Phase the hosted game is in.
    pub phase: GamePhase,
}

impl HealthResponse {
    /// Create a health response indicating the host loops are running.
    pub fn ok(phase: GamePhase) -> Self {
        Self {
            status: "ok".to_string(),
            phase,
        }
    }

    /// Create a health response indicating the host loops are not running.
    pub fn degraded(phase: GamePhase) -> Self {
        Self {
            status: "degraded".to_string(),
            phase,
        }
    }
}
