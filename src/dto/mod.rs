//! Request, response, and wire-event data transfer objects.

use std::time::SystemTime;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Fanout/WebSocket event payloads.
pub mod event;
/// Health endpoint payloads.
pub mod health;
/// Lobby REST request/response payloads.
pub mod lobby;
/// Shared field validators.
pub mod validation;
/// WebSocket client message payloads.
pub mod ws;

pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
