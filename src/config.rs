//! Application-level configuration loading for the quiz engine.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_ARENA_BACK_CONFIG_PATH";

/// Hard ceiling on lobby capacity regardless of configuration.
pub const MAX_PLAYERS_CEILING: usize = 20;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Minimum number of players required before the host may start a game.
    /// A value of 1 enables solo practice mode.
    pub min_players_to_start: usize,
    /// Default (and maximum) lobby capacity when a request leaves it unset.
    pub max_players_per_lobby: usize,
    /// Countdown applied to each question when a lobby does not override it.
    pub default_question_timer_secs: u64,
    /// Number of questions played per game session.
    pub total_questions: usize,
    /// Pause between the round result reveal and the next question.
    pub reveal_grace_secs: u64,
    /// How long a disconnected player is retained before being dropped.
    pub disconnect_drop_secs: u64,
    /// A connection with no traffic for this long is treated as disconnected.
    pub connection_idle_secs: u64,
    /// Upper bound on any single AI question/grading call.
    pub ai_timeout_secs: u64,
    /// Whether join/submit operations require a verified identity token.
    pub require_authentication: bool,
    /// Length of generated lobby codes.
    pub lobby_code_length: usize,
    /// AI question source settings; `None` forces the stored fallback pool.
    pub ai: Option<AiSettings>,
}

#[derive(Debug, Clone, Deserialize)]
/// Connection settings for the AI question/grading collaborator.
pub struct AiSettings {
    /// API key for the inference endpoint.
    pub api_key: String,
    /// Base URL of the OpenAI-compatible endpoint.
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    /// Model identifier passed on each request.
    #[serde(default = "default_ai_model")]
    pub model: String,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded configuration");
                    raw.into()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        // The API key can always be supplied through the environment so
        // deployments never have to write secrets into the config file.
        if config.ai.is_none()
            && let Ok(key) = env::var("AI_API_KEY")
            && !key.is_empty()
        {
            config.ai = Some(AiSettings {
                api_key: key,
                base_url: default_ai_base_url(),
                model: default_ai_model(),
            });
        }

        config
    }

    /// Question countdown as a [`Duration`].
    pub fn question_timer(&self) -> Duration {
        Duration::from_secs(self.default_question_timer_secs)
    }

    /// Reveal grace interval as a [`Duration`].
    pub fn reveal_grace(&self) -> Duration {
        Duration::from_secs(self.reveal_grace_secs)
    }

    /// Disconnected-player retention threshold as a [`Duration`].
    pub fn disconnect_drop(&self) -> Duration {
        Duration::from_secs(self.disconnect_drop_secs)
    }

    /// Idle bound after which a silent connection is dropped.
    pub fn connection_idle(&self) -> Duration {
        Duration::from_secs(self.connection_idle_secs)
    }

    /// Bound applied to AI question fetches and answer grading calls.
    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            min_players_to_start: 1,
            max_players_per_lobby: 8,
            default_question_timer_secs: 30,
            total_questions: 5,
            reveal_grace_secs: 5,
            disconnect_drop_secs: 60,
            connection_idle_secs: 300,
            ai_timeout_secs: 8,
            require_authentication: false,
            lobby_code_length: 6,
            ai: None,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    min_players_to_start: Option<usize>,
    max_players_per_lobby: Option<usize>,
    default_question_timer_secs: Option<u64>,
    total_questions: Option<usize>,
    reveal_grace_secs: Option<u64>,
    disconnect_drop_secs: Option<u64>,
    connection_idle_secs: Option<u64>,
    ai_timeout_secs: Option<u64>,
    require_authentication: Option<bool>,
    lobby_code_length: Option<usize>,
    ai: Option<AiSettings>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            min_players_to_start: raw
                .min_players_to_start
                .unwrap_or(defaults.min_players_to_start)
                .max(1),
            max_players_per_lobby: raw
                .max_players_per_lobby
                .unwrap_or(defaults.max_players_per_lobby)
                .clamp(1, MAX_PLAYERS_CEILING),
            default_question_timer_secs: raw
                .default_question_timer_secs
                .unwrap_or(defaults.default_question_timer_secs)
                .max(1),
            total_questions: raw
                .total_questions
                .unwrap_or(defaults.total_questions)
                .max(1),
            reveal_grace_secs: raw.reveal_grace_secs.unwrap_or(defaults.reveal_grace_secs),
            disconnect_drop_secs: raw
                .disconnect_drop_secs
                .unwrap_or(defaults.disconnect_drop_secs)
                .max(1),
            connection_idle_secs: raw
                .connection_idle_secs
                .unwrap_or(defaults.connection_idle_secs)
                .max(1),
            ai_timeout_secs: raw.ai_timeout_secs.unwrap_or(defaults.ai_timeout_secs).max(1),
            require_authentication: raw
                .require_authentication
                .unwrap_or(defaults.require_authentication),
            lobby_code_length: raw
                .lobby_code_length
                .unwrap_or(defaults.lobby_code_length)
                .clamp(4, 10),
            ai: raw.ai,
        }
    }
}

fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".into()
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_config_clamps_out_of_range_values() {
        let raw = RawConfig {
            min_players_to_start: Some(0),
            max_players_per_lobby: Some(500),
            default_question_timer_secs: Some(0),
            total_questions: Some(0),
            reveal_grace_secs: None,
            disconnect_drop_secs: Some(0),
            connection_idle_secs: Some(0),
            ai_timeout_secs: Some(0),
            require_authentication: None,
            lobby_code_length: Some(1),
            ai: None,
        };

        let config: AppConfig = raw.into();
        assert_eq!(config.min_players_to_start, 1);
        assert_eq!(config.max_players_per_lobby, MAX_PLAYERS_CEILING);
        assert_eq!(config.default_question_timer_secs, 1);
        assert_eq!(config.total_questions, 1);
        assert_eq!(config.disconnect_drop_secs, 1);
        assert_eq!(config.lobby_code_length, 4);
    }

    #[test]
    fn defaults_allow_solo_practice() {
        let config = AppConfig::default();
        assert_eq!(config.min_players_to_start, 1);
        assert!(config.ai.is_none());
    }
}
