//! Configuration loader with layered sources.

use crate::AppConfig;
use config::{Config, ConfigError, Environment, File};
use hmdp_core::HmdpError;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Environment variable selecting the environment-specific file.
pub const ENVIRONMENT_VAR: &str = "HMDP_ENVIRONMENT";

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. Environment variables with `HMDP__` prefix (`HMDP__CACHE__STRATEGY=mutex`)
    pub fn new(config_dir: impl Into<String>) -> Result<Self, HmdpError> {
        let config_dir = config_dir.into();
        let config = Self::load_config(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, HmdpError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    pub async fn reload(&self) -> Result<(), HmdpError> {
        let new_config = Self::load_config(&self.config_dir)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Loads configuration from the specified directory.
    fn load_config(config_dir: &str) -> Result<AppConfig, HmdpError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "development".to_string());

        info!("Loading configuration for environment: {}", environment);

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = format!("{}/{}.toml", config_dir, name);
            if Path::new(&path).exists() {
                debug!("Loading config layer from: {}", path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("HMDP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error_to_hmdp_error)?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(config_error_to_hmdp_error)?;

        Self::validate_config(&app_config)?;

        Ok(app_config)
    }

    /// Validates the configuration.
    pub fn validate_config(config: &AppConfig) -> Result<(), HmdpError> {
        if config.redis.enabled && config.redis.url.is_empty() {
            return Err(HmdpError::Configuration(
                "Redis URL is required when Redis is enabled".to_string(),
            ));
        }

        if !config.redis.enabled && config.app.environment == "production" {
            warn!("Redis disabled in production; falling back to the in-process store");
        }

        let cache = &config.cache;
        if cache.rebuild_workers == 0 {
            return Err(HmdpError::Configuration(
                "cache.rebuild_workers must be at least 1".to_string(),
            ));
        }
        if cache.rebuild_queue_capacity == 0 {
            return Err(HmdpError::Configuration(
                "cache.rebuild_queue_capacity must be at least 1".to_string(),
            ));
        }
        if cache.lock_ttl_secs == 0 {
            return Err(HmdpError::Configuration(
                "cache.lock_ttl_secs must be positive".to_string(),
            ));
        }
        if cache.lock_max_attempts == 0 {
            return Err(HmdpError::Configuration(
                "cache.lock_max_attempts must be at least 1".to_string(),
            ));
        }
        if cache.lock_prefix.is_empty() {
            return Err(HmdpError::Configuration(
                "cache.lock_prefix must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Gets a specific configuration value by key path.
    pub async fn get_value<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let config = self.config.read().await;
        let json = serde_json::to_value(&*config).ok()?;

        let mut current = &json;
        for part in key.split('.') {
            current = current.get(part)?;
        }

        serde_json::from_value(current.clone()).ok()
    }
}

fn config_error_to_hmdp_error(err: ConfigError) -> HmdpError {
    HmdpError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheStrategy;
    use std::fs;

    #[tokio::test]
    async fn test_loads_default_layer() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
            [cache]
            shop_ttl_secs = 60
            null_ttl_secs = 10
            lock_ttl_secs = 3
            lock_prefix = "mutex:"
            lock_retry_delay_ms = 5
            lock_max_attempts = 7
            rebuild_workers = 2
            rebuild_queue_capacity = 16
            rebuild_shutdown_timeout_secs = 1
            strategy = "mutex"
            store_failure_policy = "fail"
            "#,
        )
        .unwrap();

        let loader = ConfigLoader::new(dir.path().to_string_lossy()).unwrap();
        let config = loader.get().await;
        assert_eq!(config.cache.strategy, CacheStrategy::Mutex);
        assert_eq!(config.cache.lock_prefix, "mutex:");
        assert_eq!(config.redis.pool_size, 10);

        let attempts: Option<u32> = loader.get_value("cache.lock_max_attempts").await;
        assert_eq!(attempts, Some(7));
    }

    #[tokio::test]
    async fn test_missing_directory_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path().join("absent").to_string_lossy()).unwrap();
        let config = loader.get().await;
        assert_eq!(config.cache.rebuild_workers, 10);
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.toml");
        fs::write(&path, "[app]\nname = \"first\"\nversion = \"1\"\nenvironment = \"test\"\n").unwrap();

        let loader = ConfigLoader::new(dir.path().to_string_lossy()).unwrap();
        assert_eq!(loader.get().await.app.name, "first");

        fs::write(&path, "[app]\nname = \"second\"\nversion = \"1\"\nenvironment = \"test\"\n").unwrap();
        loader.reload().await.unwrap();
        assert_eq!(loader.get().await.app.name, "second");
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let mut config = AppConfig::default();
        config.cache.rebuild_workers = 0;
        assert!(ConfigLoader::validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_lock_prefix() {
        let mut config = AppConfig::default();
        config.cache.lock_prefix.clear();
        assert!(ConfigLoader::validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_allows_disabled_redis_without_url() {
        let mut config = AppConfig::default();
        config.redis.enabled = false;
        config.redis.url.clear();
        assert!(ConfigLoader::validate_config(&config).is_ok());
    }
}
