//! Application configuration.

use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration. Without it documents are kept in memory.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// Redis configuration (only needed for the redis cache backend).
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// Read-through cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Slack app credentials.
    pub slack: SlackConfig,
    /// Spotify app credentials.
    pub spotify: SpotifyConfig,
    /// Weekly poll settings.
    #[serde(default)]
    pub poll: PollConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this deployment, used to build OAuth redirect URLs.
    pub url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis keys.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Which cache sits in front of the document store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Per-process TTL cache. Only coherent for a single instance.
    #[default]
    Memory,
    /// Shared Redis cache for horizontally scaled deployments.
    Redis,
    /// Every read goes to the store.
    Disabled,
}

/// Read-through cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Cache backend.
    #[serde(default)]
    pub backend: CacheBackend,
    /// Entry lifetime in seconds.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    /// Maximum entries held by the in-memory backend.
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_entries(),
        }
    }
}

/// Slack app configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    /// OAuth client ID.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Secret used to verify inbound request signatures.
    pub signing_secret: String,
    /// Bot scopes requested on install.
    #[serde(default = "default_slack_scopes")]
    pub scopes: Vec<String>,
    /// Web API base URL.
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
}

/// Spotify app configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyConfig {
    /// OAuth client ID.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// OAuth callback URL. Defaults to `{server.url}/spotify/callback`.
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Accounts service base URL (authorize and token endpoints).
    #[serde(default = "default_spotify_accounts_base")]
    pub accounts_base: String,
    /// Web API base URL.
    #[serde(default = "default_spotify_api_base")]
    pub api_base: String,
}

/// Weekly poll configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// Category assigned to newly created polls.
    #[serde(default = "default_category")]
    pub default_category: String,
    /// IANA timezone in which poll periods are computed.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// How many times a conflicting poll/user write is retried.
    #[serde(default = "default_max_update_attempts")]
    pub max_update_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            default_category: default_category(),
            timezone: default_timezone(),
            max_update_attempts: default_max_update_attempts(),
        }
    }
}

impl PollConfig {
    /// Parse the configured timezone.
    pub fn tz(&self) -> Result<Tz, config::ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| config::ConfigError::Message(format!("invalid poll.timezone: {e}")))
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

fn default_redis_prefix() -> String {
    "tunepoll".to_string()
}

const fn default_cache_ttl() -> u64 {
    300
}

const fn default_cache_entries() -> usize {
    1024
}

fn default_slack_scopes() -> Vec<String> {
    ["channels:read", "groups:read", "chat:write", "users:read"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_spotify_accounts_base() -> String {
    "https://accounts.spotify.com".to_string()
}

fn default_spotify_api_base() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_category() -> String {
    "general".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

const fn default_max_update_attempts() -> u32 {
    8
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present, into the process environment)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `TUNEPOLL_ENV`)
    /// 4. Environment variables with `TUNEPOLL_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();
        let env = std::env::var("TUNEPOLL_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(Self::environment())
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(Self::environment())
            .build()?;

        config.try_deserialize()
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("TUNEPOLL")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("slack.scopes")
            .try_parsing(true)
    }

    /// Spotify OAuth callback URL.
    #[must_use]
    pub fn spotify_redirect_uri(&self) -> String {
        self.spotify.redirect_uri.clone().unwrap_or_else(|| {
            format!("{}/spotify/callback", self.server.url.trim_end_matches('/'))
        })
    }

    /// Slack OAuth callback URL.
    #[must_use]
    pub fn slack_redirect_uri(&self) -> String {
        format!("{}/slack/oauth_redirect", self.server.url.trim_end_matches('/'))
    }
}
