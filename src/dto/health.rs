//! Health endpoint payloads.

use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok").
    pub status: String,
    /// Number of active lobbies on this instance.
    pub active_lobbies: usize,
    /// Number of registered real-time connections.
    pub connections: usize,
    /// Whether the AI question source is installed (fallback pool otherwise).
    pub ai_source: bool,
}
