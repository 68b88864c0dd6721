//! Health projection over the shared state.

use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with the instance's health and a few capacity gauges.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        active_lobbies: state.active_lobby_count(),
        connections: state.registry().len(),
        ai_source: state.question_source().await.is_some(),
    }
}
