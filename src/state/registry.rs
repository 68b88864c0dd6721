//! Registry mapping live connections to identities and joined lobbies.
//!
//! An explicit, lifecycle-scoped instance owned by [`AppState`](super::AppState)
//! rather than a process-wide table, so tests and multiple instances each
//! hold an independent registry.

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifier assigned to each accepted WebSocket.
pub type ConnectionId = Uuid;

#[derive(Clone)]
/// Handle used to push messages to a connected client.
pub struct ClientConnection {
    /// Server-assigned connection id.
    pub id: ConnectionId,
    /// Identity the connection authenticated as.
    pub user_id: String,
    /// Writer channel feeding the socket's send half.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Connection bookkeeping: who is this socket, and how do we reach user X.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ClientConnection>,
    by_user: DashMap<String, ConnectionId>,
    lobby_by_connection: DashMap<ConnectionId, String>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, superseding any previous socket of the same user.
    pub fn register(&self, connection: ClientConnection) {
        self.by_user
            .insert(connection.user_id.clone(), connection.id);
        self.connections.insert(connection.id, connection);
    }

    /// Remove a connection; returns the lobby it was bound to, if any.
    pub fn unregister(&self, id: &ConnectionId) -> Option<String> {
        if let Some((_, connection)) = self.connections.remove(id) {
            // Only clear the user index if it still points at this socket; a
            // newer connection of the same user may already have replaced it.
            self.by_user
                .remove_if(&connection.user_id, |_, current| current == id);
        }
        self.lobby_by_connection.remove(id).map(|(_, code)| code)
    }

    /// Record which lobby a connection has joined.
    pub fn bind_lobby(&self, id: ConnectionId, code: &str) {
        self.lobby_by_connection.insert(id, code.to_string());
    }

    /// Clear a connection's lobby binding.
    pub fn clear_lobby(&self, id: &ConnectionId) {
        self.lobby_by_connection.remove(id);
    }

    /// Lobby the connection is currently joined to.
    pub fn lobby_of(&self, id: &ConnectionId) -> Option<String> {
        self.lobby_by_connection
            .get(id)
            .map(|entry| entry.value().clone())
    }

    /// Look up a connection by id.
    pub fn connection(&self, id: &ConnectionId) -> Option<ClientConnection> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    /// Reach a user's active connection, if one exists on this instance.
    pub fn resolve_user(&self, user_id: &str) -> Option<ClientConnection> {
        let id = *self.by_user.get(user_id)?;
        self.connection(&id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(user: &str) -> ClientConnection {
        let (tx, _rx) = mpsc::unbounded_channel();
        ClientConnection {
            id: Uuid::new_v4(),
            user_id: user.into(),
            tx,
        }
    }

    #[test]
    fn register_and_resolve_user() {
        let registry = ConnectionRegistry::new();
        let conn = connection("alice");
        let id = conn.id;
        registry.register(conn);

        assert_eq!(registry.resolve_user("alice").unwrap().id, id);
        assert!(registry.resolve_user("bob").is_none());
    }

    #[test]
    fn newer_socket_supersedes_user_index() {
        let registry = ConnectionRegistry::new();
        let old = connection("alice");
        let old_id = old.id;
        registry.register(old);

        let new = connection("alice");
        let new_id = new.id;
        registry.register(new);
        assert_eq!(registry.resolve_user("alice").unwrap().id, new_id);

        // Dropping the stale socket must not evict the fresh one.
        registry.unregister(&old_id);
        assert_eq!(registry.resolve_user("alice").unwrap().id, new_id);
    }

    #[test]
    fn unregister_returns_bound_lobby() {
        let registry = ConnectionRegistry::new();
        let conn = connection("alice");
        let id = conn.id;
        registry.register(conn);
        registry.bind_lobby(id, "ABCD");

        assert_eq!(registry.lobby_of(&id).as_deref(), Some("ABCD"));
        assert_eq!(registry.unregister(&id).as_deref(), Some("ABCD"));
        assert!(registry.is_empty());
    }
}
