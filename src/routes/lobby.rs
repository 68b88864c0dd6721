//! REST endpoints mapping 1:1 onto the lobby manager operations.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, header::AUTHORIZATION},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::lobby::{
        ActionRequest, CreateLobbyRequest, JoinLobbyRequest, LeaveResponse, LobbySummary,
        ReadyRequest,
    },
    error::AppError,
    services::{
        auth_service::{self, Identity},
        lobby_service,
    },
    state::SharedState,
};

/// Routes handling lobby lifecycle operations.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/lobbies", post(create_lobby).get(list_lobbies))
        .route("/api/lobbies/{code}", get(get_lobby))
        .route("/api/lobbies/{code}/join", post(join_lobby))
        .route("/api/lobbies/{code}/leave", post(leave_lobby))
        .route("/api/lobbies/{code}/ready", post(set_ready))
        .route("/api/lobbies/{code}/start", post(start_game))
}

async fn resolve(
    state: &SharedState,
    headers: &HeaderMap,
    user_id: &str,
    display_name: &str,
) -> Result<Identity, AppError> {
    let token = auth_service::bearer_token(
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok()),
    );
    Ok(auth_service::resolve_identity(state, token, user_id, display_name).await?)
}

/// Create a new lobby with the caller as host.
#[utoipa::path(
    post,
    path = "/api/lobbies",
    tag = "lobby",
    request_body = CreateLobbyRequest,
    responses(
        (status = 200, description = "Lobby created", body = LobbySummary)
    )
)]
pub async fn create_lobby(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Valid(Json(payload)): Valid<Json<CreateLobbyRequest>>,
) -> Result<Json<LobbySummary>, AppError> {
    let identity = resolve(&state, &headers, &payload.user_id, &payload.display_name).await?;
    let summary = lobby_service::create_lobby(&state, &identity, payload.settings).await?;
    Ok(Json(summary))
}

/// List lobbies that are open for joins.
#[utoipa::path(
    get,
    path = "/api/lobbies",
    tag = "lobby",
    responses(
        (status = 200, description = "Waiting lobbies, newest first", body = [LobbySummary])
    )
)]
pub async fn list_lobbies(State(state): State<SharedState>) -> Json<Vec<LobbySummary>> {
    Json(lobby_service::list_lobbies(&state).await)
}

/// Current projection of a lobby.
#[utoipa::path(
    get,
    path = "/api/lobbies/{code}",
    tag = "lobby",
    params(("code" = String, Path, description = "Lobby code")),
    responses(
        (status = 200, description = "Lobby state", body = LobbySummary),
        (status = 404, description = "Unknown lobby code")
    )
)]
pub async fn get_lobby(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<LobbySummary>, AppError> {
    let summary = lobby_service::get_lobby(&state, &code).await?;
    Ok(Json(summary))
}

/// Join an existing lobby.
#[utoipa::path(
    post,
    path = "/api/lobbies/{code}/join",
    tag = "lobby",
    params(("code" = String, Path, description = "Lobby code")),
    request_body = JoinLobbyRequest,
    responses(
        (status = 200, description = "Joined (idempotent for members)", body = LobbySummary),
        (status = 404, description = "Unknown lobby code"),
        (status = 409, description = "Lobby full or not accepting joins")
    )
)]
pub async fn join_lobby(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Valid(Json(payload)): Valid<Json<JoinLobbyRequest>>,
) -> Result<Json<LobbySummary>, AppError> {
    let identity = resolve(&state, &headers, &payload.user_id, &payload.display_name).await?;
    let summary = lobby_service::join_lobby(&state, &code, &identity, None).await?;
    Ok(Json(summary))
}

/// Leave a lobby; a no-op for non-members.
#[utoipa::path(
    post,
    path = "/api/lobbies/{code}/leave",
    tag = "lobby",
    params(("code" = String, Path, description = "Lobby code")),
    request_body = ActionRequest,
    responses(
        (status = 200, description = "Left the lobby", body = LeaveResponse)
    )
)]
pub async fn leave_lobby(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Valid(Json(payload)): Valid<Json<ActionRequest>>,
) -> Result<Json<LeaveResponse>, AppError> {
    let identity = resolve(&state, &headers, &payload.user_id, "").await?;
    let outcome = lobby_service::leave_lobby(&state, &code, &identity.user_id).await?;
    Ok(Json(LeaveResponse {
        closed: outcome.closed,
        lobby: outcome.lobby,
    }))
}

/// Toggle the caller's ready flag.
#[utoipa::path(
    post,
    path = "/api/lobbies/{code}/ready",
    tag = "lobby",
    params(("code" = String, Path, description = "Lobby code")),
    request_body = ReadyRequest,
    responses(
        (status = 200, description = "Ready flag updated", body = LobbySummary),
        (status = 404, description = "Unknown lobby or non-member")
    )
)]
pub async fn set_ready(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Valid(Json(payload)): Valid<Json<ReadyRequest>>,
) -> Result<Json<LobbySummary>, AppError> {
    let identity = resolve(&state, &headers, &payload.user_id, "").await?;
    let summary = lobby_service::set_ready(&state, &code, &identity.user_id, payload.ready).await?;
    Ok(Json(summary))
}

/// Start the game; host only.
#[utoipa::path(
    post,
    path = "/api/lobbies/{code}/start",
    tag = "lobby",
    params(("code" = String, Path, description = "Lobby code")),
    request_body = ActionRequest,
    responses(
        (status = 200, description = "Game started", body = LobbySummary),
        (status = 401, description = "Caller is not the host"),
        (status = 409, description = "Preconditions not met")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    headers: HeaderMap,
    Valid(Json(payload)): Valid<Json<ActionRequest>>,
) -> Result<Json<LobbySummary>, AppError> {
    let identity = resolve(&state, &headers, &payload.user_id, "").await?;
    let summary = lobby_service::start_game(&state, &code, &identity.user_id).await?;
    Ok(Json(summary))
}
