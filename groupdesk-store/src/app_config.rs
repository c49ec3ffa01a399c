use groupdesk_shared::Masked;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    pub bootstrap: Option<BootstrapConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

fn default_max_connections() -> u32 { 10 }
fn default_acquire_timeout() -> u64 { 3 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: Masked<String>,
    pub jwt_expiration_seconds: u64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

fn default_bcrypt_cost() -> u32 { 12 }

/// First administrator, created on start-up when no agency exists yet.
#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapConfig {
    pub agency_code: String,
    pub agency_name: String,
    pub admin_username: String,
    pub admin_password: Masked<String>,
}

/// Seat hold and ledger tuning.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InventoryConfig {
    pub hold_ttl_seconds: u64,
    /// Upper bound on waiting for a bucket or group row lock.
    pub lock_timeout_ms: u64,
    /// Pause before the single retry of a contended operation.
    pub retry_backoff_ms: u64,
    /// All buckets of a flight group must share one currency.
    pub enforce_single_currency: bool,
    pub expiry_sweep_seconds: u64,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            hold_ttl_seconds: 900,
            lock_timeout_ms: 3000,
            retry_backoff_ms: 50,
            enforce_single_currency: true,
            expiry_sweep_seconds: 60,
        }
    }
}

/// Longest hold a deployment may configure: 30 days.
pub const MAX_HOLD_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

impl InventoryConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Postgres reads `lock_timeout = 0` as "wait forever", so zero is refused.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.lock_timeout_ms == 0 {
            return Err(config::ConfigError::Message(
                "inventory.lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.hold_ttl_seconds == 0 || self.hold_ttl_seconds > MAX_HOLD_TTL_SECONDS {
            return Err(config::ConfigError::Message(format!(
                "inventory.hold_ttl_seconds must be between 1 and {}",
                MAX_HOLD_TTL_SECONDS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct JobsConfig {
    pub poll_interval_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 1000 }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `GROUPDESK__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("GROUPDESK").separator("__"))
            .build()?;

        Self::from_source(s)
    }

    pub fn from_source(source: config::Config) -> Result<Self, config::ConfigError> {
        let cfg: Self = source.try_deserialize()?;
        cfg.inventory.validate()?;
        Ok(cfg)
    }
}
