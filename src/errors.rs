//! Errors for the ETA tracker
use thiserror::Error;

pub type Result<T, E = EtaTrackerError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum EtaTrackerError {
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Fetching {url} failed after {attempts} attempt(s): {reason}")]
    FetchFailed {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Page rendering failed: {0}")]
    RenderFailed(String),

    #[error("{terminal}: no link matching '{pattern}' on page")]
    LinkNotFound {
        terminal: &'static str,
        pattern: String,
        /// Page that lacked the link, kept for diagnosis
        markup: String,
    },

    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Invalid configuration: {message}")]
    ConfigurationError { message: String },

    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid vessel event: {0}")]
    InvalidVesselEvent(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Database migration error")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),
}

impl From<lettre::error::Error> for EtaTrackerError {
    fn from(e: lettre::error::Error) -> Self {
        EtaTrackerError::Mail(e.to_string())
    }
}

impl From<lettre::address::AddressError> for EtaTrackerError {
    fn from(e: lettre::address::AddressError) -> Self {
        EtaTrackerError::Mail(e.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for EtaTrackerError {
    fn from(e: lettre::transport::smtp::Error) -> Self {
        EtaTrackerError::Mail(e.to_string())
    }
}
