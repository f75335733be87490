use crate::application::DataManagerConfig;
use crate::infrastructure::CircuitBreakerConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Name of the breaker guarding corpus reloads.
pub const DATA_LOADER_BREAKER: &str = "data-loader";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Corpus settings
    pub data_dir: PathBuf,
    pub cache_timeout_secs: u64,
    pub file_watching: bool,
    pub refresh_interval_secs: u64,
    pub debug: bool,

    // Circuit breaker defaults
    pub breaker_failure_threshold: u32,
    pub breaker_recovery_timeout_ms: u64,
    pub breaker_request_timeout_ms: u64,
    pub breaker_monitoring_period_ms: u64,
    pub breaker_half_open_max_calls: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            cache_timeout_secs: 300,
            file_watching: true,
            refresh_interval_secs: 60,
            debug: false,
            breaker_failure_threshold: 5,
            breaker_recovery_timeout_ms: 30_000,
            breaker_request_timeout_ms: 10_000,
            breaker_monitoring_period_ms: 60_000,
            breaker_half_open_max_calls: 1,
        }
    }
}

impl ServerConfig {
    /// Reject settings the server cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingDataDir);
        }
        if self.cache_timeout_secs == 0 {
            return Err(ConfigError::NotPositive("cache_timeout_secs"));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::NotPositive("refresh_interval_secs"));
        }
        self.breaker_config(DATA_LOADER_BREAKER).validate()
    }

    /// Breaker settings for a named resource, using the configured defaults.
    pub fn breaker_config(&self, name: &str) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            name: name.to_string(),
            failure_threshold: self.breaker_failure_threshold,
            recovery_timeout: Duration::from_millis(self.breaker_recovery_timeout_ms),
            request_timeout: Duration::from_millis(self.breaker_request_timeout_ms),
            monitoring_period: Duration::from_millis(self.breaker_monitoring_period_ms),
            half_open_max_calls: self.breaker_half_open_max_calls,
        }
    }

    pub fn data_manager_config(&self) -> DataManagerConfig {
        DataManagerConfig {
            data_dir: self.data_dir.clone(),
            cache_timeout: Duration::from_secs(self.cache_timeout_secs),
            enable_file_watching: self.file_watching,
            refresh_interval: Some(Duration::from_secs(self.refresh_interval_secs)),
            breaker: self.breaker_config(DATA_LOADER_BREAKER),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("data_dir is required")]
    MissingDataDir,
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("DESIGN_CORPUS_{}", key)).ok()
}

fn env_flag(key: &str, default: bool) -> bool {
    env_var(key)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(default)
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env_var(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: format!("DESIGN_CORPUS_{}", key),
            value,
        }),
        None => Ok(default),
    }
}

pub fn load_config() -> Result<ServerConfig, ConfigError> {
    let defaults = ServerConfig::default();

    let data_dir = env_var("DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.data_dir);

    let debug = std::env::var("DEBUG").is_ok() || env_flag("DEBUG", false);

    let config = ServerConfig {
        data_dir,
        cache_timeout_secs: env_number("CACHE_TIMEOUT_SECS", defaults.cache_timeout_secs)?,
        file_watching: env_flag("FILE_WATCHING", defaults.file_watching),
        refresh_interval_secs: env_number("REFRESH_INTERVAL_SECS", defaults.refresh_interval_secs)?,
        debug,
        breaker_failure_threshold: env_number(
            "BREAKER_FAILURE_THRESHOLD",
            defaults.breaker_failure_threshold,
        )?,
        breaker_recovery_timeout_ms: env_number(
            "BREAKER_RECOVERY_TIMEOUT_MS",
            defaults.breaker_recovery_timeout_ms,
        )?,
        breaker_request_timeout_ms: env_number(
            "BREAKER_REQUEST_TIMEOUT_MS",
            defaults.breaker_request_timeout_ms,
        )?,
        breaker_monitoring_period_ms: env_number(
            "BREAKER_MONITORING_PERIOD_MS",
            defaults.breaker_monitoring_period_ms,
        )?,
        breaker_half_open_max_calls: env_number(
            "BREAKER_HALF_OPEN_MAX_CALLS",
            defaults.breaker_half_open_max_calls,
        )?,
    };

    config.validate()?;
    Ok(config)
}
