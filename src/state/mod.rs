//! Shared application state and the per-lobby ownership model.

/// Fanout channel port and in-memory implementation.
pub mod fanout;
/// Game session and answer models.
pub mod game;
/// Lobby and player models.
pub mod lobby;
/// Connection registry.
pub mod registry;
/// Game phase machine.
pub mod state_machine;
/// Cancelable fire-once timers.
pub mod timer;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};

use crate::{
    config::AppConfig,
    quiz::{fallback::FallbackPool, source::QuestionSource},
    services::auth_service::IdentityVerifier,
    state::{
        fanout::{FanoutChannel, InMemoryFanout},
        game::GameSession,
        lobby::Lobby,
        state_machine::GameStateMachine,
    },
};

pub use self::registry::{ClientConnection, ConnectionId, ConnectionRegistry};
pub use self::timer::{TimerHandle, TimerScheduler};

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Default capacity of each fanout topic channel.
const FANOUT_TOPIC_CAPACITY: usize = 64;

/// Everything owned by one lobby code, guarded by a single mutex so that
/// join/leave/start/submit and timer fires for the same code never
/// interleave. Different codes lock independently and run in parallel.
pub struct LobbyState {
    /// Membership and settings.
    pub lobby: Lobby,
    /// Phase machine for the lobby's game.
    pub machine: GameStateMachine,
    /// Active game session, present only while in game.
    pub session: Option<GameSession>,
}

impl LobbyState {
    /// Wrap a freshly created lobby with an idle machine and no session.
    pub fn new(lobby: Lobby) -> Self {
        Self {
            lobby,
            machine: GameStateMachine::new(),
            session: None,
        }
    }
}

/// Handle to one lobby's serialized state.
pub type LobbyCell = Arc<Mutex<LobbyState>>;

/// Central application state wiring registries, lobbies, and ports together.
pub struct AppState {
    config: AppConfig,
    lobbies: DashMap<String, LobbyCell>,
    registry: ConnectionRegistry,
    fanout: Arc<dyn FanoutChannel>,
    timers: Arc<TimerScheduler>,
    question_source: RwLock<Option<Arc<dyn QuestionSource>>>,
    fallback_pool: FallbackPool,
    verifier: RwLock<Option<Arc<dyn IdentityVerifier>>>,
}

impl AppState {
    /// Construct the state with the in-memory fanout backend.
    pub fn new(config: AppConfig) -> SharedState {
        Self::with_fanout(config, Arc::new(InMemoryFanout::new(FANOUT_TOPIC_CAPACITY)))
    }

    /// Construct the state over an explicit fanout backend (tests, brokers).
    pub fn with_fanout(config: AppConfig, fanout: Arc<dyn FanoutChannel>) -> SharedState {
        Arc::new(Self {
            config,
            lobbies: DashMap::new(),
            registry: ConnectionRegistry::new(),
            fanout,
            timers: Arc::new(TimerScheduler::new()),
            question_source: RwLock::new(None),
            fallback_pool: FallbackPool::new(),
            verifier: RwLock::new(None),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registry of live connections on this instance.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Fanout channel distributing lobby events.
    pub fn fanout(&self) -> &Arc<dyn FanoutChannel> {
        &self.fanout
    }

    /// Scheduler owning every pending lobby timer.
    pub fn timers(&self) -> &Arc<TimerScheduler> {
        &self.timers
    }

    /// Look up the cell for a lobby code.
    pub fn lobby_cell(&self, code: &str) -> Option<LobbyCell> {
        self.lobbies.get(code).map(|entry| entry.value().clone())
    }

    /// Register a new lobby cell; fails when the code is already taken.
    pub fn insert_lobby(&self, code: &str, cell: LobbyCell) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.lobbies.entry(code.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(cell);
                true
            }
        }
    }

    /// Drop a lobby cell from the active index.
    pub fn remove_lobby(&self, code: &str) {
        self.lobbies.remove(code);
    }

    /// Whether a lobby code is currently active.
    pub fn contains_lobby(&self, code: &str) -> bool {
        self.lobbies.contains_key(code)
    }

    /// Number of active lobbies on this instance.
    pub fn active_lobby_count(&self) -> usize {
        self.lobbies.len()
    }

    /// Snapshot of all lobby cells for listing endpoints.
    pub fn lobby_cells(&self) -> Vec<(String, LobbyCell)> {
        self.lobbies
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Obtain a handle to the AI question source, if one is installed.
    pub async fn question_source(&self) -> Option<Arc<dyn QuestionSource>> {
        let guard = self.question_source.read().await;
        guard.as_ref().cloned()
    }

    /// Install the AI question source.
    pub async fn install_question_source(&self, source: Arc<dyn QuestionSource>) {
        let mut guard = self.question_source.write().await;
        *guard = Some(source);
    }

    /// Deterministic stored question pool, always available.
    pub fn fallback_pool(&self) -> &FallbackPool {
        &self.fallback_pool
    }

    /// Obtain the identity verifier, if one is installed.
    pub async fn verifier(&self) -> Option<Arc<dyn IdentityVerifier>> {
        let guard = self.verifier.read().await;
        guard.as_ref().cloned()
    }

    /// Install the identity verifier capability.
    pub async fn install_verifier(&self, verifier: Arc<dyn IdentityVerifier>) {
        let mut guard = self.verifier.write().await;
        *guard = Some(verifier);
    }
}

/// Timer key for a lobby's single round/grace countdown.
pub fn round_timer_key(code: &str) -> String {
    format!("{code}:round")
}

/// Timer key for a disconnected player's retention countdown.
pub fn drop_timer_key(code: &str, user_id: &str) -> String {
    format!("{code}:drop:{user_id}")
}

/// Prefix covering every timer owned by a lobby.
pub fn lobby_timer_prefix(code: &str) -> String {
    format!("{code}:")
}
