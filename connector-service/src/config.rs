use serde::{Deserialize, Serialize};
use shared::database::DatabaseConfig;
use shared::observability::{LogConfig, LogFormat, LogLevel};
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub mirakl: MiraklConfig,
    pub adyen: AdyenConfig,
    pub mail: MailConfig,
    pub connector: ConnectorConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiraklConfig {
    pub api_url: String,
    pub operator_api_key: String,
    pub page_size: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdyenEnvironment {
    Test,
    Live,
}

impl AdyenEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            AdyenEnvironment::Test => "https://cal-test.adyen.com/cal/services",
            AdyenEnvironment::Live => "https://cal-live.adyen.com/cal/services",
        }
    }
}

impl FromStr for AdyenEnvironment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TEST" => Ok(AdyenEnvironment::Test),
            "LIVE" => Ok(AdyenEnvironment::Live),
            _ => Err(ConfigError::InvalidValue("ADYEN_ENVIRONMENT".to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdyenConfig {
    pub username: String,
    pub password: String,
    pub environment: AdyenEnvironment,
    pub app_name: String,
    /// Overrides the environment's base URL when set
    pub endpoint: Option<String>,
    pub timeout_seconds: u64,
}

impl AdyenConfig {
    pub fn base_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| self.environment.base_url().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
    pub from_name: String,
    pub operator_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub max_ubos: u32,
    pub max_doc_retries: i32,
    pub max_payout_failed: i32,
    pub max_email_retries: i32,
    pub default_processing_tier: Option<i32>,
    /// ISO-2 country code -> regex capturing the house number in a street line
    pub house_number_patterns: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub shop_sync_cron: String,
    pub doc_sync_cron: String,
    pub doc_retry_cron: String,
    pub payout_retry_cron: String,
    pub email_send_interval_seconds: u64,
}

const TRAILING_HOUSE_NUMBER: &str = r"\s([a-zA-Z]*\d+[a-zA-Z]*)$";
const LEADING_HOUSE_NUMBER: &str = r"^(\d+[a-zA-Z]*)\s";

pub fn default_house_number_patterns() -> BTreeMap<String, String> {
    let mut patterns = BTreeMap::new();
    for country in ["NL", "BE", "DE", "AT", "CH", "DK", "NO", "SE", "FI", "PL", "ES", "IT"] {
        patterns.insert(country.to_string(), TRAILING_HOUSE_NUMBER.to_string());
    }
    for country in ["GB", "US", "FR", "IE", "CA", "AU"] {
        patterns.insert(country.to_string(), LEADING_HOUSE_NUMBER.to_string());
    }
    patterns
}

/// Parse `CC=regex;CC=regex` into a pattern table
pub fn parse_house_number_patterns(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut patterns = BTreeMap::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (country, pattern) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidValue(format!("HOUSE_NUMBER_PATTERNS entry '{}'", entry)))?;
        patterns.insert(country.trim().to_uppercase(), pattern.to_string());
    }
    Ok(patterns)
}

fn parse_env<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let house_number_patterns = match optional_env("HOUSE_NUMBER_PATTERNS") {
            Some(raw) => parse_house_number_patterns(&raw)?,
            None => defaults.connector.house_number_patterns.clone(),
        };

        let default_processing_tier = match optional_env("DEFAULT_PROCESSING_TIER") {
            Some(tier) => Some(
                tier.parse()
                    .map_err(|_| ConfigError::InvalidValue("DEFAULT_PROCESSING_TIER".to_string()))?,
            ),
            None => None,
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidPort)?,
            },
            database: DatabaseConfig::from_env(),
            mirakl: MiraklConfig {
                api_url: env::var("MIRAKL_API_URL").unwrap_or(defaults.mirakl.api_url),
                operator_api_key: env::var("MIRAKL_OPERATOR_API_KEY").unwrap_or_default(),
                page_size: parse_env("MIRAKL_PAGE_SIZE", "100")?,
                timeout_seconds: parse_env("MIRAKL_TIMEOUT_SECONDS", "60")?,
            },
            adyen: AdyenConfig {
                username: env::var("ADYEN_USERNAME").unwrap_or_default(),
                password: env::var("ADYEN_PASSWORD").unwrap_or_default(),
                environment: parse_env("ADYEN_ENVIRONMENT", "TEST")?,
                app_name: env::var("ADYEN_APP_NAME").unwrap_or(defaults.adyen.app_name),
                endpoint: optional_env("ADYEN_ENDPOINT"),
                timeout_seconds: parse_env("ADYEN_TIMEOUT_SECONDS", "60")?,
            },
            mail: MailConfig {
                smtp_host: env::var("SMTP_HOST").unwrap_or(defaults.mail.smtp_host),
                smtp_port: parse_env("SMTP_PORT", "587")?,
                smtp_username: env::var("SMTP_USERNAME").unwrap_or_default(),
                smtp_password: env::var("SMTP_PASSWORD").unwrap_or_default(),
                from_address: env::var("MAIL_FROM_ADDRESS").unwrap_or(defaults.mail.from_address),
                from_name: env::var("MAIL_FROM_NAME").unwrap_or(defaults.mail.from_name),
                operator_email: optional_env("OPERATOR_EMAIL"),
            },
            connector: ConnectorConfig {
                max_ubos: parse_env("SHOP_MAX_UBOS", "4")?,
                max_doc_retries: parse_env("MAX_DOC_RETRIES", "5")?,
                max_payout_failed: parse_env("MAX_PAYOUT_FAILED", "5")?,
                max_email_retries: parse_env("MAX_EMAIL_RETRIES", "5")?,
                default_processing_tier,
                house_number_patterns,
            },
            scheduler: SchedulerConfig {
                shop_sync_cron: env::var("SHOP_SYNC_CRON").unwrap_or(defaults.scheduler.shop_sync_cron),
                doc_sync_cron: env::var("DOC_SYNC_CRON").unwrap_or(defaults.scheduler.doc_sync_cron),
                doc_retry_cron: env::var("DOC_RETRY_CRON").unwrap_or(defaults.scheduler.doc_retry_cron),
                payout_retry_cron: env::var("PAYOUT_RETRY_CRON")
                    .unwrap_or(defaults.scheduler.payout_retry_cron),
                email_send_interval_seconds: parse_env("EMAIL_SEND_INTERVAL_SECONDS", "30")?,
            },
            logging: LogConfig {
                level: parse_env::<LogLevel>("LOG_LEVEL", "info")?,
                format: parse_env::<LogFormat>("LOG_FORMAT", "json")?,
                ..defaults.logging
            },
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound)?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidConfig("Max connections must be > 0".to_string()));
        }

        if self.connector.max_ubos == 0 {
            return Err(ConfigError::InvalidConfig("Max UBOs must be > 0".to_string()));
        }

        if self.mirakl.operator_api_key.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("Mirakl operator API key is required".to_string()));
        }

        if self.adyen.username.trim().is_empty() || self.adyen.password.is_empty() {
            return Err(ConfigError::InvalidConfig("Adyen credentials are required".to_string()));
        }

        for (country, pattern) in &self.connector.house_number_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                ConfigError::InvalidConfig(format!("House number pattern for {}: {}", country, e))
            })?;
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig::default(),
            mirakl: MiraklConfig {
                api_url: "http://localhost:9000".to_string(),
                operator_api_key: "operator-key".to_string(),
                page_size: 100,
                timeout_seconds: 60,
            },
            adyen: AdyenConfig {
                username: "ws@MarketPlace.Connector".to_string(),
                password: "password".to_string(),
                environment: AdyenEnvironment::Test,
                app_name: "marketplace-connector".to_string(),
                endpoint: None,
                timeout_seconds: 60,
            },
            mail: MailConfig {
                smtp_host: "localhost".to_string(),
                smtp_port: 587,
                smtp_username: String::new(),
                smtp_password: String::new(),
                from_address: "noreply@connector.local".to_string(),
                from_name: "Marketplace Connector".to_string(),
                operator_email: None,
            },
            connector: ConnectorConfig {
                max_ubos: 4,
                max_doc_retries: 5,
                max_payout_failed: 5,
                max_email_retries: 5,
                default_processing_tier: None,
                house_number_patterns: default_house_number_patterns(),
            },
            scheduler: SchedulerConfig {
                shop_sync_cron: "0 */5 * * * *".to_string(),
                doc_sync_cron: "30 */5 * * * *".to_string(),
                doc_retry_cron: "0 */15 * * * *".to_string(),
                payout_retry_cron: "0 */30 * * * *".to_string(),
                email_send_interval_seconds: 30,
            },
            logging: LogConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found")]
    FileNotFound,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<shared::observability::ObservabilityError> for ConfigError {
    fn from(err: shared::observability::ObservabilityError) -> Self {
        ConfigError::InvalidConfig(err.to_string())
    }
}
