use std::{env, str::FromStr, time::Duration};

use tracing::warn;

/// Runtime settings, read once from the environment at startup.
///
/// Listener settings (address, port, TLS) stay with Rocket's own `ROCKET_*`
/// variables.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub neynar_api_key: Option<String>,
    pub neynar_api_url: String,
    pub follower_request_timeout: Duration,
    /// How many avatars end up under the mines of a new game.
    pub follower_limit: usize,
    pub follower_cache_ttl: Duration,
    pub image_cache_ttl: Duration,
    pub cleanup_interval: Duration,
    pub inactive_game_timeout: Duration,
    pub active_game_timeout: Duration,
    pub games_per_minute: u32,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            neynar_api_key: None,
            neynar_api_url: "https://api.neynar.com".to_string(),
            follower_request_timeout: Duration::from_secs(10),
            follower_limit: 8,
            follower_cache_ttl: Duration::from_secs(30 * 60),
            image_cache_ttl: Duration::from_secs(60 * 60),
            cleanup_interval: Duration::from_secs(60),
            inactive_game_timeout: Duration::from_secs(600),
            active_game_timeout: Duration::from_secs(86400),
            games_per_minute: 10,
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            Duration::from_secs(parse_or(name, env::var(name).ok(), default.as_secs()))
        };

        Self {
            neynar_api_key: env::var("NEYNAR_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            neynar_api_url: env::var("NEYNAR_API_URL").unwrap_or(defaults.neynar_api_url),
            follower_request_timeout: secs(
                "FOLLOWER_REQUEST_TIMEOUT_SECONDS",
                defaults.follower_request_timeout,
            ),
            follower_limit: parse_or(
                "FOLLOWER_LIMIT",
                env::var("FOLLOWER_LIMIT").ok(),
                defaults.follower_limit,
            ),
            follower_cache_ttl: secs("FOLLOWER_CACHE_TTL_SECONDS", defaults.follower_cache_ttl),
            image_cache_ttl: secs("IMAGE_CACHE_TTL_SECONDS", defaults.image_cache_ttl),
            cleanup_interval: secs("CLEANUP_INTERVAL_SECONDS", defaults.cleanup_interval),
            inactive_game_timeout: secs(
                "INACTIVE_GAME_TIMEOUT_SECONDS",
                defaults.inactive_game_timeout,
            ),
            active_game_timeout: secs("ACTIVE_GAME_TIMEOUT_SECONDS", defaults.active_game_timeout),
            games_per_minute: parse_or(
                "RATE_LIMIT_GAMES_PER_MINUTE",
                env::var("RATE_LIMIT_GAMES_PER_MINUTE").ok(),
                defaults.games_per_minute,
            ),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|raw| split_origins(&raw))
                .unwrap_or(defaults.cors_allowed_origins),
        }
    }
}

fn parse_or<T: FromStr>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable {}={:?}, using default", name, raw);
            default
        }),
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_falls_back_on_missing_or_garbage() {
        assert_eq!(parse_or("X", None, 60u64), 60);
        assert_eq!(parse_or("X", Some(" 15 ".to_string()), 60u64), 15);
        assert_eq!(parse_or("X", Some("soon".to_string()), 60u64), 60);
    }

    #[test]
    fn origins_are_trimmed_and_empty_entries_dropped() {
        assert_eq!(
            split_origins("https://a.example, ,https://b.example,"),
            vec!["https://a.example", "https://b.example"]
        );
    }
}
