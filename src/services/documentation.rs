//! OpenAPI documentation generation.

use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quiz Arena Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::lobby::create_lobby,
        crate::routes::lobby::list_lobbies,
        crate::routes::lobby::get_lobby,
        crate::routes::lobby::join_lobby,
        crate::routes::lobby::leave_lobby,
        crate::routes::lobby::set_ready,
        crate::routes::lobby::start_game,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::lobby::CreateLobbyRequest,
            crate::dto::lobby::LobbySettingsInput,
            crate::dto::lobby::JoinLobbyRequest,
            crate::dto::lobby::ActionRequest,
            crate::dto::lobby::ReadyRequest,
            crate::dto::lobby::LobbySummary,
            crate::dto::lobby::PlayerSummary,
            crate::dto::lobby::LeaveResponse,
            crate::dto::ws::ClientMessage,
            crate::dto::event::ServerEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "lobby", description = "Lobby lifecycle operations"),
        (name = "realtime", description = "WebSocket gameplay transport"),
    )
)]
pub struct ApiDoc;
