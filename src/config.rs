//! Application-level configuration loading, including host timings and collaborator endpoints.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationSecondsWithFrac, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/host.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_HOST_CONFIG_PATH";

/// Timing knobs for every timer the host runs.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timings {
    /// How long the buzzer stays open before the answer is revealed.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub buzz: Duration,
    /// How long a player who buzzed has to answer.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub answer: Duration,
    /// How long the player who found a daily double has to name a wager.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub daily_double_wager: Duration,
    /// Upper bound on waiting for a narration completion signal.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub narration_wait: Duration,
    /// Countdown between reaching the player quota and board generation.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub preference_countdown: Duration,
    /// Delay between two category reveals.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub category_reveal: Duration,
    /// Reconciliation loop polling interval.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub reconcile_interval: Duration,
    /// Window in which an identical narration request is considered a duplicate.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub narration_dedup_window: Duration,
    /// Time allotted to final round wagers.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub final_wager: Duration,
    /// Time allotted to final round answers.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub final_answer: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            buzz: Duration::from_secs(5),
            answer: Duration::from_secs(7),
            daily_double_wager: Duration::from_secs(30),
            narration_wait: Duration::from_secs(30),
            preference_countdown: Duration::from_secs(10),
            category_reveal: Duration::from_millis(1_500),
            reconcile_interval: Duration::from_secs(1),
            narration_dedup_window: Duration::from_secs(2),
            final_wager: Duration::from_secs(30),
            final_answer: Duration::from_secs(30),
        }
    }
}

/// Endpoints of the HTTP collaborators; any missing entry falls back to a local implementation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollaboratorEndpoints {
    /// Answer judge endpoint (`POST {expected, submitted}`).
    pub judge_url: Option<String>,
    /// Clue resolver endpoint (`POST {message, available}`).
    pub resolver_url: Option<String>,
    /// Speech synthesis endpoint (`POST {text, voice}`).
    pub speech_url: Option<String>,
    /// Board generator endpoint (`POST {preferences}`).
    pub generator_url: Option<String>,
}

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Display name the host uses in chat.
    pub host_name: String,
    /// Voice passed to the speech synthesizer.
    pub voice: String,
    /// Number of registered players that starts the game.
    pub player_quota: usize,
    /// Directory holding board JSON documents.
    pub board_dir: PathBuf,
    /// Board loaded when generation fails.
    pub fallback_board: String,
    /// Timer settings.
    pub timings: Timings,
    /// Collaborator endpoints.
    pub collaborators: CollaboratorEndpoints,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host_name: "Alex".into(),
            voice: "Timothy".into(),
            player_quota: 3,
            board_dir: PathBuf::from("game_data"),
            fallback_board: "default".into(),
            timings: Timings::default(),
            collaborators: CollaboratorEndpoints::default(),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        quota = config.player_quota,
                        "loaded host configuration"
                    );
                    config.with_env_overrides()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default().with_env_overrides()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default().with_env_overrides()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default().with_env_overrides()
            }
        }
    }

    /// Parse a configuration document; absent keys keep their default value.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str(contents)
    }

    /// Collaborator URLs may also come from the environment, which wins over the file.
    fn with_env_overrides(mut self) -> Self {
        let endpoints = &mut self.collaborators;
        for (var, slot) in [
            ("JUDGE_URL", &mut endpoints.judge_url),
            ("RESOLVER_URL", &mut endpoints.resolver_url),
            ("SPEECH_URL", &mut endpoints.speech_url),
            ("GENERATOR_URL", &mut endpoints.generator_url),
        ] {
            if let Some(value) = env::var(var).ok().filter(|value| !value.trim().is_empty()) {
                *slot = Some(value);
            }
        }
        self
    }
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
    fn defaults_match_host_rules() {
        let config = AppConfig::default();
        assert_eq!(config.player_quota, 3);
        assert_eq!(config.timings.buzz, Duration::from_secs(5));
        assert_eq!(config.timings.answer, Duration::from_secs(7));
        assert_eq!(config.timings.narration_wait, Duration::from_secs(30));
        assert_eq!(config.timings.preference_countdown, Duration::from_secs(10));
        assert_eq!(config.timings.category_reveal, Duration::from_millis(1_500));
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config = AppConfig::from_json(
            r#"{ "host_name": "Trebek", "timings": { "buzz": 2.5 } }"#,
        )
        .unwrap();
        assert_eq!(config.host_name, "Trebek");
        assert_eq!(config.timings.buzz, Duration::from_millis(2_500));
        assert_eq!(config.timings.answer, Duration::from_secs(7));
        assert_eq!(config.player_quota, 3);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(AppConfig::from_json(r#"{ "colors": [] }"#).is_err());
    }
}
