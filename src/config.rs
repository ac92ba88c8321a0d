use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::models::DEFAULT_COOKIE_PREFIX;
use crate::payload::{PayloadBuilder, DEFAULT_IGNORED_FIELD_PATTERNS};
use crate::validation::InputValidator;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub notify: NotifyConfig,
    pub feed: FeedConfig,
}

/// SQLite location and pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

/// Log level, format and optional file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

/// Credentials and endpoints of the leads API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Account username sent with every lead
    pub username: String,
    /// Value of the `x-api-key` header; an empty key disables the feed
    pub key: String,
    /// Site name sent with credential tests
    pub site: String,
    pub lead_url: String,
    pub verify_url: String,
}

/// Where delivery failures are reported
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub maintainer_email: String,
    /// Public URL of the site, quoted in failure emails
    pub site_url: String,
}

/// Payload assembly settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub cookie_prefix: String,
    /// Regexes for hidden control and anti-spam fields
    pub ignored_field_patterns: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/lead_feed.db".to_string(),
                max_connections: 10,
                connection_timeout_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            api: ApiConfig {
                username: String::new(),
                key: String::new(),
                site: "localhost".to_string(),
                lead_url: "https://2w0s6jr7og.execute-api.us-east-1.amazonaws.com/live/leads/bvi-form/new"
                    .to_string(),
                verify_url:
                    "https://2w0s6jr7og.execute-api.us-east-1.amazonaws.com/live/leads/bvi-form/verify"
                        .to_string(),
            },
            notify: NotifyConfig {
                maintainer_email: "webmaster@localhost.localdomain".to_string(),
                site_url: "http://localhost".to_string(),
            },
            feed: FeedConfig {
                cookie_prefix: DEFAULT_COOKIE_PREFIX.to_string(),
                ignored_field_patterns: DEFAULT_IGNORED_FIELD_PATTERNS
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&Self::default())
            .map_err(|e| anyhow::anyhow!("Failed to build default configuration: {}", e))?;

        let config = Config::builder()
            // Start with default values
            .add_source(defaults)
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("config").required(false))
            // Add environment variables with prefix
            .add_source(
                Environment::with_prefix("LEAD_FEED")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("feed.ignored_field_patterns")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate database config
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(anyhow::anyhow!("connection_timeout_secs must be greater than 0"));
        }
        InputValidator::validate_database_url(&self.database.url)?;

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        // Validate API config; username and key may stay empty until an admin sets them
        InputValidator::validate_endpoint_url(&self.api.lead_url)?;
        InputValidator::validate_endpoint_url(&self.api.verify_url)?;
        if !self.api.username.is_empty() {
            InputValidator::validate_username(&self.api.username)?;
        }
        if !self.api.key.is_empty() {
            InputValidator::validate_api_key(&self.api.key)?;
        }

        // Validate notification config
        InputValidator::validate_email(&self.notify.maintainer_email)?;

        // Validate feed config
        if self.feed.cookie_prefix.is_empty() {
            return Err(anyhow::anyhow!("cookie_prefix cannot be empty"));
        }
        PayloadBuilder::new(&self.feed.ignored_field_patterns)
            .map_err(|e| anyhow::anyhow!("Invalid ignored_field_patterns: {}", e))?;

        Ok(())
    }

    /// Get database URL from environment or config
    #[must_use]
    pub fn get_database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.database.url.clone())
    }

    /// Get log level from environment or config
    #[must_use]
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }
}
