use config::ConfigError;
use serde::Deserialize;
use std::env;

/// One month. Larger values overflow timestamp arithmetic in the sweeper.
pub const MAX_VERIFICATION_TTL_MINUTES: i64 = 30 * 24 * 60;
pub const MAX_SWEEP_INTERVAL_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Seats under payment review show as taken on the public seat map.
    #[serde(default = "default_true")]
    pub hold_seats_pending_verification: bool,
    pub verification_ttl_minutes: i64,
    pub sweep_interval_seconds: u64,
    /// Legacy rows without a reference get one when their proof is uploaded.
    #[serde(default)]
    pub backfill_missing_references: bool,
    #[serde(default = "default_max_proof_bytes")]
    pub max_proof_bytes: usize,
}

impl BusinessRules {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_VERIFICATION_TTL_MINUTES).contains(&self.verification_ttl_minutes) {
            return Err(ConfigError::Message(format!(
                "business_rules.verification_ttl_minutes must be between 1 and {}, got {}",
                MAX_VERIFICATION_TTL_MINUTES, self.verification_ttl_minutes
            )));
        }
        if !(1..=MAX_SWEEP_INTERVAL_SECONDS).contains(&self.sweep_interval_seconds) {
            return Err(ConfigError::Message(format!(
                "business_rules.sweep_interval_seconds must be between 1 and {}, got {}",
                MAX_SWEEP_INTERVAL_SECONDS, self.sweep_interval_seconds
            )));
        }
        if self.max_proof_bytes == 0 {
            return Err(ConfigError::Message("business_rules.max_proof_bytes must be positive".into()));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_max_proof_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_max_connections() -> u32 {
    5
}

fn default_requests_per_minute() -> i64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Unset means in-memory repositories.
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Unset disables rate limiting.
    pub url: Option<String>,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: i64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Base64 data URL kept in the booking row.
    Inline,
    Filesystem,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[serde(default)]
    pub directory: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. MARQUEE__DATABASE__URL=postgres://...
            .add_source(config::Environment::with_prefix("MARQUEE").separator("__"))
            .build()?;

        Self::from_sources(s)
    }

    fn from_sources(s: config::Config) -> Result<Self, ConfigError> {
        let config: Config = s.try_deserialize()?;
        config.business_rules.validate()?;
        if config.redis.requests_per_minute < 1 {
            return Err(ConfigError::Message("redis.requests_per_minute must be positive".into()));
        }
        Ok(config)
    }
}
