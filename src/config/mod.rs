//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Battle timing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BattleSettings {
    /// Delay between pairing and the start of the battle window
    pub start_delay: Duration,
    /// Length of the battle window
    pub duration: Duration,
    /// How long the controller waits for both readiness acknowledgements
    pub ready_timeout: Duration,
}

impl Default for BattleSettings {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_secs(5),
            duration: Duration::from_secs(110),
            ready_timeout: Duration::from_secs(3),
        }
    }
}

/// Matchmaking queue tuning
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchmakingSettings {
    /// How often queues are scanned
    pub interval: Duration,
    /// Wait time per extra point of tolerance
    pub expand_interval: Duration,
    pub max_rank_range: i32,
    pub max_level_range: i32,
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            expand_interval: Duration::from_millis(500),
            max_rank_range: 100,
            max_level_range: 200,
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Secret used to verify session JWTs
    pub jwt_secret: String,

    /// Supabase project URL
    pub supabase_url: Option<String>,
    /// Supabase service role key (bypasses RLS - server only!)
    pub supabase_service_role_key: Option<String>,

    /// Character catalog JSON
    pub character_catalog: PathBuf,
    /// Allowed client origin for CORS
    pub client_origin: String,

    pub battle: BattleSettings,
    pub matchmaking: MatchmakingSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let battle_defaults = BattleSettings::default();
        let matchmaking_defaults = MatchmakingSettings::default();

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            jwt_secret: lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,

            supabase_url: lookup("SUPABASE_URL").filter(|v| !v.is_empty()),
            supabase_service_role_key: lookup("SUPABASE_SERVICE_ROLE_KEY")
                .filter(|v| !v.is_empty()),

            character_catalog: lookup("CHARACTER_CATALOG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("assets/characters.json")),
            client_origin: lookup("CLIENT_ORIGIN").unwrap_or_else(|| "*".to_string()),

            battle: BattleSettings {
                start_delay: Duration::from_secs(parse_or(
                    &lookup,
                    "BATTLE_START_DELAY_SECS",
                    battle_defaults.start_delay.as_secs(),
                )?),
                duration: Duration::from_secs(parse_or(
                    &lookup,
                    "BATTLE_DURATION_SECS",
                    battle_defaults.duration.as_secs(),
                )?),
                ready_timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "READY_TIMEOUT_SECS",
                    battle_defaults.ready_timeout.as_secs(),
                )?),
            },

            matchmaking: MatchmakingSettings {
                interval: Duration::from_millis(parse_or(
                    &lookup,
                    "MATCH_INTERVAL_MS",
                    matchmaking_defaults.interval.as_millis() as u64,
                )?),
                expand_interval: Duration::from_millis(parse_or(
                    &lookup,
                    "EXPAND_INTERVAL_MS",
                    matchmaking_defaults.expand_interval.as_millis() as u64,
                )?),
                max_rank_range: parse_or(
                    &lookup,
                    "MAX_RANK_RANGE",
                    matchmaking_defaults.max_rank_range,
                )?,
                max_level_range: parse_or(
                    &lookup,
                    "MAX_LEVEL_RANGE",
                    matchmaking_defaults.max_level_range,
                )?,
            },
        })
    }

    /// Supabase credentials, when both are configured
    pub fn supabase(&self) -> Option<(&str, &str)> {
        match (&self.supabase_url, &self.supabase_service_role_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_with_only_secret() {
        let config = load(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.battle, BattleSettings::default());
        assert_eq!(config.matchmaking, MatchmakingSettings::default());
        assert!(config.supabase().is_none());
        assert_eq!(config.character_catalog, PathBuf::from("assets/characters.json"));
    }

    #[test]
    fn port_wins_over_server_addr() {
        let config = load(&[
            ("JWT_SECRET", "s"),
            ("PORT", "9000"),
            ("SERVER_ADDR", "127.0.0.1:1"),
        ])
        .unwrap();
        assert_eq!(config.server_addr.port(), 9000);
    }

    #[test]
    fn missing_secret_is_an_error() {
        assert!(matches!(load(&[]), Err(ConfigError::Missing("JWT_SECRET"))));
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let err = load(&[("JWT_SECRET", "s"), ("MAX_RANK_RANGE", "lots")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "MAX_RANK_RANGE",
                ..
            }
        ));
    }

    #[test]
    fn supabase_needs_both_values() {
        let config = load(&[("JWT_SECRET", "s"), ("SUPABASE_URL", "https://x.supabase.co")]).unwrap();
        assert!(config.supabase().is_none());

        let config = load(&[
            ("JWT_SECRET", "s"),
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "key"),
        ])
        .unwrap();
        assert_eq!(config.supabase(), Some(("https://x.supabase.co", "key")));
    }
}
