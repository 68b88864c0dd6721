/// Answer collection and score engine.
pub mod answer_service;
/// Identity verification port and token gating.
pub mod auth_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Typed event builders and fanout publishing.
pub mod event_service;
/// Round lifecycle driver for the game state machine.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Lobby lifecycle and membership operations.
pub mod lobby_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
