//! HTTP route composition.

use axum::Router;

use crate::state::SharedState;

/// Swagger UI.
pub mod docs;
/// Health check.
pub mod health;
/// Lobby REST endpoints.
pub mod lobby;
/// WebSocket endpoint.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(websocket::router())
        .merge(lobby::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
