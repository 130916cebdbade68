use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub auction: AuctionConfig,
    /// Absent means the in-memory store
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine rules and retry policy
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AuctionConfig {
    /// Icon stages draw only players of the matching role
    #[serde(default = "default_true")]
    pub pick_by_stage_role: bool,
    /// Advance the stage once it has no eligible players left
    #[serde(default)]
    pub auto_advance_stage: bool,
    /// Retries for transient store contention (0 = no retry)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff step between retries
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    50
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            pick_by_stage_role: true,
            auto_advance_stage: false,
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the daily rolling log file; console only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("auction.pick_by_stage_role", true)?
            .set_default("auction.auto_advance_stage", false)?
            .set_default("auction.max_retries", 3)?
            .set_default("auction.retry_backoff_ms", 50)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("AUCTION_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (AUCTION__DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("AUCTION")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.auction.max_retries > 10 {
            errors.push(format!(
                "auction.max_retries must be at most 10, got {}",
                self.auction.max_retries
            ));
        }

        if let Some(db) = &self.database {
            if db.url.trim().is_empty() {
                errors.push("database.url cannot be empty".to_string());
            }
            if db.max_connections == 0 {
                errors.push("database.max_connections must be positive".to_string());
            }
        }

        let level = self.logging.level.to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            errors.push(format!("logging.level is not a level: {}", self.logging.level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::load_from("/nonexistent/auction-config").unwrap();
        assert!(config.validate().is_ok());
        assert!(config.auction.pick_by_stage_role);
        assert!(!config.auction.auto_advance_stage);
        assert!(config.database.is_none());
    }

    #[test]
    fn test_validate_collects_errors() {
        let mut config = AppConfig::load_from("/nonexistent/auction-config").unwrap();
        config.auction.max_retries = 50;
        config.database = Some(DatabaseConfig {
            url: " ".to_string(),
            max_connections: 0,
        });
        config.logging.level = "loud".to_string();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let config = AppConfig::load_from("/nonexistent/auction-config").unwrap();
        assert!(config.auction.pick_by_stage_role);
        assert_eq!(config.auction.max_retries, 3);
        assert_eq!(config.logging.level, "info");
    }
}
