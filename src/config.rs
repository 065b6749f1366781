use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Expiration windows a creator may pick, in hours
pub const ALLOWED_EXPIRATION_HOURS: [i64; 4] = [24, 48, 72, 168];

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
    pub migrations_path: String,
}

/// Which store backend the service runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl StorageBackend {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(format!(
                "Invalid STORAGE_BACKEND: {}. Must be one of: [\"postgres\", \"memory\"]",
                s
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Postgres => "postgres",
            StorageBackend::Memory => "memory",
        }
    }
}

/// Gift room business and resilience settings
#[derive(Debug, Clone)]
pub struct GiftRoomConfig {
    pub min_amount_per_gift: Decimal,
    pub referral_bonus: Decimal,
    pub default_expiration_hours: i64,
    pub claim_grace_minutes: i64,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: i64,
    pub max_reservations_per_device: i64,
    pub join_rate_limit_per_minute: u32,
    pub device_salt: String,
    pub ledger_timeout_ms: u64,
    pub ledger_max_attempts: u32,
    pub ledger_retry_backoff_ms: u64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_backend: StorageBackend,
    pub database: Option<DatabaseConfig>,
    pub gift_rooms: GiftRoomConfig,
    pub log_level: String,
    pub http_port: u16,
    pub environment: String,
    pub session_secret: String,
    pub session_max_age_secs: i64,
    pub audit_log_dir: String,
    /// Take the client address from `X-Forwarded-For`; only behind a proxy that sets it
    pub trust_forwarded_for: bool,
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("Invalid value for {}: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl DatabaseConfig {
    /// Create database config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable is required")?;

        let max_connections = parse_env("DATABASE_MAX_CONNECTIONS", 10u32)?;
        let acquire_timeout_secs = parse_env("DATABASE_ACQUIRE_TIMEOUT_SECS", 30u64)?;
        let idle_timeout_secs = parse_env("DATABASE_IDLE_TIMEOUT_SECS", 600u64)?; // 10 minutes
        let max_lifetime_secs = parse_env("DATABASE_MAX_LIFETIME_SECS", 1800u64)?; // 30 minutes
        let test_before_acquire = parse_env("DATABASE_TEST_BEFORE_ACQUIRE", true)?;
        let migrations_path =
            env::var("MIGRATIONS_PATH").unwrap_or_else(|_| "./migrations".to_string());

        if max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            url,
            max_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
            test_before_acquire,
            migrations_path,
        })
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get max lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/giftroom".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            test_before_acquire: true,
            migrations_path: "./migrations".to_string(),
        }
    }
}

impl GiftRoomConfig {
    /// Create gift room config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let config = Self {
            min_amount_per_gift: parse_env("GIFT_MIN_AMOUNT", defaults.min_amount_per_gift)?,
            referral_bonus: parse_env("GIFT_REFERRAL_BONUS", defaults.referral_bonus)?,
            default_expiration_hours: parse_env(
                "GIFT_DEFAULT_EXPIRATION_HOURS",
                defaults.default_expiration_hours,
            )?,
            claim_grace_minutes: parse_env("GIFT_CLAIM_GRACE_MINUTES", defaults.claim_grace_minutes)?,
            sweep_interval_secs: parse_env("GIFT_SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs)?,
            sweep_batch_size: parse_env("GIFT_SWEEP_BATCH_SIZE", defaults.sweep_batch_size)?,
            max_reservations_per_device: parse_env(
                "GIFT_MAX_RESERVATIONS_PER_DEVICE",
                defaults.max_reservations_per_device,
            )?,
            join_rate_limit_per_minute: parse_env(
                "GIFT_JOIN_RATE_LIMIT_PER_MINUTE",
                defaults.join_rate_limit_per_minute,
            )?,
            device_salt: env::var("GIFT_DEVICE_SALT").unwrap_or(defaults.device_salt),
            ledger_timeout_ms: parse_env("LEDGER_TIMEOUT_MS", defaults.ledger_timeout_ms)?,
            ledger_max_attempts: parse_env("LEDGER_MAX_ATTEMPTS", defaults.ledger_max_attempts)?,
            ledger_retry_backoff_ms: parse_env(
                "LEDGER_RETRY_BACKOFF_MS",
                defaults.ledger_retry_backoff_ms,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the services cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.min_amount_per_gift <= Decimal::ZERO {
            return Err("GIFT_MIN_AMOUNT must be greater than 0".to_string());
        }
        if self.referral_bonus < Decimal::ZERO {
            return Err("GIFT_REFERRAL_BONUS must not be negative".to_string());
        }
        if !ALLOWED_EXPIRATION_HOURS.contains(&self.default_expiration_hours) {
            return Err(format!(
                "Invalid GIFT_DEFAULT_EXPIRATION_HOURS: {}. Must be one of: {:?}",
                self.default_expiration_hours, ALLOWED_EXPIRATION_HOURS
            ));
        }
        if self.claim_grace_minutes < 0 {
            return Err("GIFT_CLAIM_GRACE_MINUTES must not be negative".to_string());
        }
        if self.sweep_interval_secs == 0 || self.sweep_batch_size <= 0 {
            return Err("Sweep interval and batch size must be greater than 0".to_string());
        }
        if self.max_reservations_per_device <= 0 {
            return Err("GIFT_MAX_RESERVATIONS_PER_DEVICE must be greater than 0".to_string());
        }
        if self.ledger_timeout_ms == 0 || self.ledger_max_attempts == 0 {
            return Err("LEDGER_TIMEOUT_MS and LEDGER_MAX_ATTEMPTS must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn claim_grace(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.claim_grace_minutes)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.ledger_retry_backoff_ms)
    }
}

impl Default for GiftRoomConfig {
    fn default() -> Self {
        Self {
            min_amount_per_gift: Decimal::new(50, 0),
            referral_bonus: Decimal::new(100, 0),
            default_expiration_hours: 48,
            claim_grace_minutes: 60,
            sweep_interval_secs: 60,
            sweep_batch_size: 100,
            max_reservations_per_device: 1,
            join_rate_limit_per_minute: 20,
            device_salt: "giftroom".to_string(),
            ledger_timeout_ms: 5000,
            ledger_max_attempts: 3,
            ledger_retry_backoff_ms: 100,
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let storage_backend = StorageBackend::from_str(
            &env::var("STORAGE_BACKEND").unwrap_or_else(|_| "postgres".to_string()),
        )?;

        let database = match storage_backend {
            StorageBackend::Postgres => Some(DatabaseConfig::from_env()?),
            StorageBackend::Memory => None,
        };

        let gift_rooms = GiftRoomConfig::from_env()?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let http_port = parse_env("HTTP_PORT", 8080u16)?;
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let session_max_age_secs = parse_env("SESSION_MAX_AGE_SECS", 86_400i64)?;
        let audit_log_dir = env::var("AUDIT_LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
        let trust_forwarded_for = parse_env("TRUST_FORWARDED_FOR", false)?;

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        let environment = environment.to_lowercase();
        if !valid_environments.contains(&environment.as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        let session_secret = match env::var("SESSION_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if environment == "development" => "development-session-secret".to_string(),
            _ => return Err("SESSION_SECRET is required outside development".to_string()),
        };

        if session_max_age_secs <= 0 {
            return Err("SESSION_MAX_AGE_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            storage_backend,
            database,
            gift_rooms,
            log_level: log_level.to_lowercase(),
            http_port,
            environment,
            session_secret,
            session_max_age_secs,
            audit_log_dir,
            trust_forwarded_for,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::Memory,
            database: None,
            gift_rooms: GiftRoomConfig::default(),
            log_level: "info".to_string(),
            http_port: 8080,
            environment: "development".to_string(),
            session_secret: "development-session-secret".to_string(),
            session_max_age_secs: 86_400,
            audit_log_dir: "./logs".to_string(),
            trust_forwarded_for: false,
        }
    }
}
