//! Application configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;
use tracing::warn;

use crate::errors::EtaTrackerError;

pub const ENV_PREFIX: &str = "ETATRACKER";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub processor: ProcessorConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub clean: CleanConfig,
    pub database: Option<DatabaseConfig>,
    pub smtp: Option<SmtpConfig>,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub retry_attempts: u32,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub retry_delay: Duration,
    pub eurogate: EurogateConfig,
    pub hhla: HhlaConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct EurogateConfig {
    pub base_url: String,
    pub start_url: String,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: Duration,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct HhlaConfig {
    pub url: String,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: Duration,
    /// External renderer argv; the page URL is appended. Empty disables
    /// scripted rendering.
    #[serde(default)]
    pub render_command: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessorConfig {
    pub fuzzy_match_threshold: u8,
    pub export_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CleanConfig {
    pub max_age_days: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_server")]
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub password: String,
}

fn default_max_connections() -> u32 {
    5
}

fn default_smtp_server() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("scraper.user_agent", "ETA-Automation/1.0")?
            .set_default("scraper.retry_attempts", 3)?
            .set_default("scraper.retry_delay", 2)?
            .set_default("scraper.eurogate.base_url", "https://www.eurogate.de")?
            .set_default(
                "scraper.eurogate.start_url",
                "https://www.eurogate.de/eportal/state/do/start",
            )?
            .set_default("scraper.eurogate.timeout", 20)?
            .set_default(
                "scraper.hhla.url",
                "https://coast.hhla.de/report?id=Standard-Report-Segelliste",
            )?
            .set_default("scraper.hhla.timeout", 30)?
            .set_default("processor.fuzzy_match_threshold", 85)?
            .set_default("processor.export_path", "data/vessel_schedule.csv")?
            .set_default("storage.data_dir", "data")?
            .set_default("logging.dir", "logs")?
            .set_default("clean.max_age_days", 7)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(" ")
                    .with_list_parse_key("scraper.hhla.render_command"),
            ))
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), EtaTrackerError> {
        self.scraper.validate()?;
        self.processor.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        Ok(())
    }
}

impl ScraperConfig {
    pub fn validate(&self) -> Result<(), EtaTrackerError> {
        if self.retry_attempts == 0 {
            return Err(configuration_error("Retry attempts must be greater than zero"));
        }
        for (name, url) in [
            ("scraper.eurogate.base_url", &self.eurogate.base_url),
            ("scraper.eurogate.start_url", &self.eurogate.start_url),
            ("scraper.hhla.url", &self.hhla.url),
        ] {
            if url.trim().is_empty() {
                return Err(configuration_error(format!("{} cannot be empty", name)));
            }
        }
        if self.eurogate.timeout.is_zero() || self.hhla.timeout.is_zero() {
            return Err(configuration_error("Timeouts must be greater than zero"));
        }
        Ok(())
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<(), EtaTrackerError> {
        if self.fuzzy_match_threshold > 100 {
            return Err(configuration_error(
                "Fuzzy match threshold must be between 0 and 100",
            ));
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), EtaTrackerError> {
        if self.url.trim().is_empty() {
            return Err(configuration_error("Database URL cannot be empty"));
        }
        if self.max_connections == 0 {
            return Err(configuration_error(
                "Database max_connections must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl StorageConfig {
    pub fn scraped_dir(&self) -> PathBuf {
        self.data_dir.join("scraped")
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.data_dir.join("debug")
    }

    /// Create the snapshot and debug directories if missing
    pub fn ensure_directories(&self) -> Result<(), EtaTrackerError> {
        ensure_directory_exists(&self.scraped_dir())?;
        ensure_directory_exists(&self.debug_dir())
    }
}

pub(crate) fn ensure_directory_exists(dir: &Path) -> Result<(), EtaTrackerError> {
    if !dir.exists() {
        warn!("Directory {} does not exist, attempting to create it", dir.display());
        std::fs::create_dir_all(dir).map_err(|e| EtaTrackerError::ConfigurationError {
            message: format!("Could not create directory {}: {}", dir.display(), e),
        })?;
    }
    Ok(())
}

fn configuration_error(message: impl Into<String>) -> EtaTrackerError {
    EtaTrackerError::ConfigurationError {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Environment variables are process-wide, so everything that touches
    // them lives in this one test.
    #[test]
    fn test_load_config() {
        env::set_var("ETATRACKER__DATABASE__URL", "postgres://localhost/eta");
        env::set_var("ETATRACKER__SCRAPER__RETRY_ATTEMPTS", "5");
        env::set_var("ETATRACKER__SCRAPER__HHLA__TIMEOUT", "45");
        env::set_var(
            "ETATRACKER__SCRAPER__HHLA__RENDER_COMMAND",
            "chromium --headless --dump-dom",
        );

        let config = AppConfig::load().unwrap();
        let database = config.database.as_ref().unwrap();
        assert_eq!(database.url, "postgres://localhost/eta");
        assert_eq!(database.max_connections, 5);
        assert_eq!(config.scraper.retry_attempts, 5);
        assert_eq!(config.scraper.retry_delay, Duration::from_secs(2));
        assert_eq!(config.scraper.hhla.timeout, Duration::from_secs(45));
        assert_eq!(
            config.scraper.hhla.render_command,
            vec!["chromium", "--headless", "--dump-dom"]
        );
        assert_eq!(config.processor.fuzzy_match_threshold, 85);
        assert_eq!(config.storage.scraped_dir(), PathBuf::from("data/scraped"));
        assert!(config.smtp.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_processor_config_validate() {
        let mut config = ProcessorConfig {
            fuzzy_match_threshold: 85,
            export_path: PathBuf::from("out.csv"),
        };
        assert!(config.validate().is_ok());

        config.fuzzy_match_threshold = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_config_validate_invalid_url() {
        let config = DatabaseConfig {
            url: " ".to_string(),
            max_connections: 5,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_config_validate_zero_connections() {
        let config = DatabaseConfig {
            url: "postgres://localhost/eta".to_string(),
            max_connections: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_creates_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            data_dir: temp_dir.path().join("data"),
        };
        storage.ensure_directories().unwrap();
        assert!(storage.scraped_dir().is_dir());
        assert!(storage.debug_dir().is_dir());
    }
}
